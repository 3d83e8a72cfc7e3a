//! In-process fake registry used by the registry and proxy tests

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::Response,
    Router,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::client::RegistryClient;
use crate::server::settings::RegistrySettings;

#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub digest: Option<String>,
    pub body: String,
}

impl CannedResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some("application/json".to_string()),
            digest: None,
            body: body.into(),
        }
    }

    pub fn manifest(content_type: &str, digest: &str, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some(content_type.to_string()),
            digest: Some(digest.to_string()),
            body: body.into(),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            digest: None,
            body: String::new(),
        }
    }

    pub fn with_digest(mut self, digest: &str) -> Self {
        self.digest = Some(digest.to_string());
        self
    }
}

/// A request as the fake registry received it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub call: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
struct FakeState {
    routes: HashMap<String, CannedResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct FakeRegistry {
    pub base_url: String,
    state: Arc<FakeState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeRegistry {
    /// Requests seen so far, formatted as `"METHOD /path"`
    pub fn calls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.call).collect()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn client(&self) -> RegistryClient {
        RegistryClient::new(&RegistrySettings {
            upstream_url: self.base_url.clone(),
            timeout_secs: 5,
            catalog_concurrency: 4,
        })
        .unwrap()
    }
}

impl Drop for FakeRegistry {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Default)]
pub struct FakeRegistryBuilder {
    routes: HashMap<String, CannedResponse>,
}

impl FakeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned response for `method` on the exact `path`
    pub fn route(mut self, method: Method, path: &str, response: CannedResponse) -> Self {
        self.routes.insert(format!("{} {}", method, path), response);
        self
    }

    pub async fn spawn(self) -> FakeRegistry {
        let state = Arc::new(FakeState {
            routes: self.routes,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .fallback(respond)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        FakeRegistry {
            base_url: format!("http://{}", addr),
            state,
            shutdown: Some(shutdown_tx),
        }
    }
}

async fn respond(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let key = format!("{} {}", method, uri.path());
    state.requests.lock().unwrap().push(RecordedRequest {
        call: key.clone(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });

    let Some(canned) = state.routes.get(&key) else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("not found"))
            .unwrap();
    };

    let mut builder = Response::builder().status(canned.status);
    if let Some(content_type) = &canned.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(digest) = &canned.digest {
        builder = builder.header("Docker-Content-Digest", digest);
    }
    builder.body(Body::from(canned.body.clone())).unwrap()
}
