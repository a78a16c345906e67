//! Mock Runtime API host for integration tests.
//!
//! Serves queued invokes from `/invocation/next`, records every post, and
//! answers the extension endpoints. Once the queue is empty `next` returns
//! a configurable error status so the runtime under test stops.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lambda_rt::{Handler, HandlerOptions, RuntimeApiClient, RuntimeError};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

pub const TRACE_ID: &str = "Root=1-5759e988-bd862e3fe1be46a994272793;Sampled=1";
pub const FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:test";

/// Which endpoint a post went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    Response,
    Error,
    InitError,
}

/// A recorded post.
#[derive(Debug, Clone)]
pub struct Posted {
    pub kind: PostKind,
    pub request_id: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub trailers: Option<HeaderMap>,
}

impl Posted {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// An invoke waiting to be handed out.
#[derive(Debug, Clone)]
pub struct QueuedInvoke {
    id: String,
    payload: Bytes,
    deadline_ms: Option<String>,
    headers: Vec<(String, String)>,
}

impl QueuedInvoke {
    /// An invoke due in 30 seconds with a trace id and function ARN.
    pub fn new(id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            deadline_ms: Some(deadline_in(Duration::from_secs(30)).to_string()),
            headers: vec![
                ("Lambda-Runtime-Trace-Id".to_string(), TRACE_ID.to_string()),
                ("Lambda-Runtime-Invoked-Function-Arn".to_string(), FUNCTION_ARN.to_string()),
            ],
        }
    }

    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        self.deadline_ms = Some(deadline_in(timeout).to_string());
        self
    }

    /// Send a raw deadline header, or none at all.
    pub fn raw_deadline(mut self, raw: Option<&str>) -> Self {
        self.deadline_ms = raw.map(str::to_string);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

fn deadline_in(timeout: Duration) -> u128 {
    (SystemTime::now() + timeout)
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis()
}

struct HostState {
    queue: Mutex<VecDeque<QueuedInvoke>>,
    posts: Mutex<Vec<Posted>>,
    registrations: Mutex<Vec<(String, serde_json::Value)>>,
    next_extension_id: AtomicUsize,
    exhausted_status: Mutex<StatusCode>,
}

/// A running mock host bound to a random local port.
pub struct MockHost {
    addr: SocketAddr,
    state: Arc<HostState>,
}

impl MockHost {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock host");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(HostState {
            queue: Mutex::new(VecDeque::new()),
            posts: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            next_extension_id: AtomicUsize::new(1),
            exhausted_status: Mutex::new(StatusCode::INTERNAL_SERVER_ERROR),
        });

        let server_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let io = TokioIo::new(stream);
                let state = server_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { route(state, req).await }
                    });
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub fn client(&self) -> Arc<RuntimeApiClient> {
        Arc::new(RuntimeApiClient::new(self.addr()))
    }

    pub fn push(&self, invoke: QueuedInvoke) {
        self.state.queue.lock().unwrap().push_back(invoke);
    }

    pub fn enqueue(&self, id: &str, payload: &str) {
        self.push(QueuedInvoke::new(id, payload.to_string()));
    }

    /// Status returned by `next` once the queue is empty.
    pub fn set_exhausted_status(&self, status: StatusCode) {
        *self.state.exhausted_status.lock().unwrap() = status;
    }

    pub fn posts(&self) -> Vec<Posted> {
        self.state.posts.lock().unwrap().clone()
    }

    pub fn post_for(&self, request_id: &str) -> Posted {
        self.posts()
            .into_iter()
            .find(|p| p.request_id == request_id)
            .unwrap_or_else(|| panic!("no post for {request_id}"))
    }

    pub fn registrations(&self) -> Vec<(String, serde_json::Value)> {
        self.state.registrations.lock().unwrap().clone()
    }

    /// Serve until the queue drains and return the error that stopped the
    /// runtime.
    pub async fn serve<H: Handler + 'static>(
        &self,
        handler: H,
        options: HandlerOptions,
        workers: usize,
    ) -> RuntimeError {
        let run = lambda_rt::serve(self.client(), handler, options, workers);
        match tokio::time::timeout(Duration::from_secs(20), run).await {
            Ok(Ok(())) => panic!("runtime stopped without an error"),
            Ok(Err(err)) => err,
            Err(_) => panic!("runtime did not stop"),
        }
    }
}

type HostResponse = Response<Full<Bytes>>;

fn reply(status: StatusCode) -> HostResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

async fn route(state: Arc<HostState>, req: Request<Incoming>) -> Result<HostResponse, Infallible> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    let collected = match body.collect().await {
        Ok(collected) => collected,
        Err(_) => return Ok(reply(StatusCode::BAD_REQUEST)),
    };
    let trailers = collected.trailers().cloned();
    let body = collected.to_bytes();

    let response = match (&parts.method, segments.as_slice()) {
        (&Method::GET, ["2018-06-01", "runtime", "invocation", "next"]) => next_invoke(&state),
        (&Method::POST, ["2018-06-01", "runtime", "invocation", id, kind]) => {
            let kind = match *kind {
                "response" => PostKind::Response,
                "error" => PostKind::Error,
                _ => return Ok(reply(StatusCode::NOT_FOUND)),
            };
            record(&state, kind, id, parts.headers, body, trailers)
        }
        (&Method::POST, ["2018-06-01", "runtime", "init", "error"]) => {
            record(&state, PostKind::InitError, "", parts.headers, body, trailers)
        }
        (&Method::POST, ["2020-01-01", "extension", "register"]) => {
            let name = parts
                .headers
                .get("Lambda-Extension-Name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let events = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
            state.registrations.lock().unwrap().push((name, events));

            let id = state.next_extension_id.fetch_add(1, Ordering::SeqCst);
            let mut response = reply(StatusCode::OK);
            response
                .headers_mut()
                .insert("Lambda-Extension-Identifier", format!("ext-{id}").parse().unwrap());
            response
        }
        (&Method::GET, ["2020-01-01", "extension", "event", "next"]) => {
            // No events were subscribed to.
            std::future::pending::<()>().await;
            reply(StatusCode::OK)
        }
        _ => reply(StatusCode::NOT_FOUND),
    };
    Ok(response)
}

fn next_invoke(state: &HostState) -> HostResponse {
    let Some(invoke) = state.queue.lock().unwrap().pop_front() else {
        return reply(*state.exhausted_status.lock().unwrap());
    };

    let mut response = Response::new(Full::new(invoke.payload));
    let headers = response.headers_mut();
    headers.insert("Lambda-Runtime-Aws-Request-Id", invoke.id.parse().unwrap());
    if let Some(deadline) = invoke.deadline_ms {
        headers.insert("Lambda-Runtime-Deadline-Ms", deadline.parse().unwrap());
    }
    for (name, value) in invoke.headers {
        headers.insert(
            hyper::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            value.parse().unwrap(),
        );
    }
    response
}

fn record(
    state: &HostState,
    kind: PostKind,
    request_id: &str,
    headers: HeaderMap,
    body: Bytes,
    trailers: Option<HeaderMap>,
) -> HostResponse {
    state.posts.lock().unwrap().push(Posted {
        kind,
        request_id: request_id.to_string(),
        headers,
        body,
        trailers,
    });
    reply(StatusCode::ACCEPTED)
}
