//! Canned-route axum server bound to 127.0.0.1 for exercising HTTP clients in tests.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub delay: Duration,
}

impl Route {
    pub fn new(path: &str, status: u16, content_type: &str, body: &str) -> Self {
        Self {
            path: path.to_string(),
            status,
            content_type: content_type.to_string(),
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(path: &str, body: &str) -> Self {
        Self::new(path, 200, "application/json", body)
    }

    pub fn html(path: &str, body: &str) -> Self {
        Self::new(path, 200, "text/html; charset=utf-8", body)
    }

    /// Waits `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone)]
struct ServerState {
    routes: Arc<Vec<Route>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct TestServer {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let state = ServerState {
            routes: Arc::new(routes),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let requests = state.requests.clone();

        let app = Router::new().fallback(respond).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn respond(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        target,
        headers: headers
            .iter()
            .map(|(key, value)| {
                (
                    key.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body,
    });

    let Some(route) = state.routes.iter().find(|route| route.path == uri.path()) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    if !route.delay.is_zero() {
        tokio::time::sleep(route.delay).await;
    }

    (
        StatusCode::from_u16(route.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        [(header::CONTENT_TYPE, route.content_type.clone())],
        route.body.clone(),
    )
        .into_response()
}
