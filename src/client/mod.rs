//! Task backend client.
//!
//! This module provides the HTTP client for the task backend and the
//! bounded, cancellable poller built on top of it.

pub mod api;
pub mod poller;

#[cfg(test)]
pub(crate) mod stub;

pub use api::{ApiError, HttpTaskApi, TaskApi};
pub use poller::{spawn_poll, PollEvent, PollPolicy, Poller};
