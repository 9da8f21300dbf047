//! Record analysis modules.
//!
//! Schema inference, the canonical filter and the aggregations that feed
//! the charts. Everything here is synchronous and side-effect free.

pub mod aggregator;
pub mod filter;
pub mod schema;

pub use aggregator::*;
pub use filter::{apply_filters, FilterContext};
pub use schema::Schema;
