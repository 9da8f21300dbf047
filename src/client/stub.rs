//! Test doubles for the task backend: a canned-response HTTP server and
//! a scripted in-memory [`TaskApi`].

use crate::client::api::{ApiError, SourceFields, TaskApi};
use crate::models::{FilterSpec, Record, TaskStatus};
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

type Routes = Arc<Vec<(String, u16, String)>>;

/// Serves one fixed response per `"METHOD /path"` route.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<(String, String)>>>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(routes: Vec<(&str, u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let routes: Routes = Arc::new(
            routes
                .into_iter()
                .map(|(route, status, body)| (route.to_string(), status, body.to_string()))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, routes, seen).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            task,
        }
    }

    /// Request bodies in arrival order.
    pub fn bodies(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: Routes,
    seen: Arc<Mutex<Vec<(String, String)>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let request_line: String = head
        .lines()
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");
    seen.lock().unwrap().push((request_line.clone(), body));

    let (status, payload) = routes
        .iter()
        .find(|(route, ..)| *route == request_line)
        .map(|(_, status, payload)| (*status, payload.clone()))
        .unwrap_or((404, r#"{"detail":"Not Found"}"#.to_string()));

    let response = format!(
        "HTTP/1.1 {} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        payload.len(),
        payload
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// In-memory [`TaskApi`] replaying a scripted status sequence.
///
/// Once the script runs out every status call returns `fallback`.
pub struct ScriptedApi {
    statuses: Mutex<VecDeque<Result<TaskStatus, ApiError>>>,
    fallback: TaskStatus,
    records: Vec<Record>,
    calls: Mutex<Vec<String>>,
    submitted: Mutex<Vec<Vec<FilterSpec>>>,
}

impl ScriptedApi {
    pub fn new(statuses: Vec<Result<TaskStatus, ApiError>>, records: Vec<Record>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            fallback: TaskStatus::Pending,
            records,
            calls: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Status sequence given as plain statuses.
    pub fn with_statuses(statuses: &[TaskStatus], records: Vec<Record>) -> Self {
        Self::new(statuses.iter().map(|s| Ok(*s)).collect(), records)
    }

    /// Call log: `"fields"`, `"create"`, `"status"`, `"data"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn submitted(&self) -> Vec<Vec<FilterSpec>> {
        self.submitted.lock().unwrap().clone()
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl TaskApi for ScriptedApi {
    fn fetch_fields(&self) -> BoxFuture<'_, Result<SourceFields, ApiError>> {
        self.log("fields");
        let fields = SourceFields {
            source_a: vec!["name".to_string(), "date".to_string()],
            source_b: vec!["date".to_string(), "location".to_string()],
        };
        futures::future::ready(Ok(fields)).boxed()
    }

    fn create_task<'a>(&'a self, filters: &'a [FilterSpec]) -> BoxFuture<'a, Result<String, ApiError>> {
        self.log("create");
        self.submitted.lock().unwrap().push(filters.to_vec());
        futures::future::ready(Ok("task-1".to_string())).boxed()
    }

    fn task_status<'a>(&'a self, _task_id: &'a str) -> BoxFuture<'a, Result<TaskStatus, ApiError>> {
        self.log("status");
        let next = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.fallback));
        futures::future::ready(next).boxed()
    }

    fn task_records<'a>(&'a self, _task_id: &'a str) -> BoxFuture<'a, Result<Vec<Record>, ApiError>> {
        self.log("data");
        futures::future::ready(Ok(self.records.clone())).boxed()
    }
}
