//! Shared test utilities for litesync integration tests.
//!
//! [`FakeProxy`] is an in-process stand-in for the LiteLLM proxy's model and
//! credential endpoints. Newly written resources can be made to read as absent
//! for a configurable number of reads, which reproduces the proxy's
//! eventual consistency.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use litesync::{Backoff, ClientConfig, HttpTransport, RetryPolicy, Transport};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// One request seen by the fake proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct ProxyState {
    models: HashMap<String, Value>,
    credentials: HashMap<String, Value>,
    /// Remaining reads that report a resource as absent, by id.
    lag: HashMap<String, u32>,
    /// Lag given to every resource written from now on.
    read_lag: u32,
    /// Answer every request with this status and body.
    forced: Option<(StatusCode, Value)>,
    requests: Vec<Seen>,
}

type Shared = Arc<Mutex<ProxyState>>;

/// Fake proxy listening on a random local port.
pub struct FakeProxy {
    pub addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeProxy {
    /// Spawn the fake proxy on the current runtime.
    pub async fn spawn() -> Self {
        let state: Shared = Arc::default();

        let router = Router::new()
            .route("/model/new", post(model_new))
            .route("/model/update", post(model_update))
            .route("/model/info", get(model_info))
            .route("/model/delete", post(model_delete))
            .route("/credentials", post(credential_create))
            .route(
                "/credentials/{name}",
                patch(credential_update).delete(credential_delete),
            )
            .route("/credentials/by_name/{name}", get(credential_read))
            .layer(middleware::from_fn_with_state(state.clone(), record))
            .with_state(state.clone());

        // Bind to port 0 to let the OS choose an available port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Transport pointed at this proxy, authenticating with `test-key`.
    pub fn transport(&self) -> Arc<dyn Transport> {
        let config = ClientConfig::new(self.base_url()).with_api_key("test-key");
        Arc::new(HttpTransport::new(&config).expect("Failed to build transport"))
    }

    /// Resources written after this call read as absent `reads` times first.
    pub fn set_read_lag(&self, reads: u32) {
        self.state.lock().unwrap().read_lag = reads;
    }

    /// Make `id` read as absent for its next `reads` reads.
    pub fn lag(&self, id: &str, reads: u32) {
        self.state.lock().unwrap().lag.insert(id.to_string(), reads);
    }

    pub fn force_response(&self, status: StatusCode, body: Value) {
        self.state.lock().unwrap().forced = Some((status, body));
    }

    pub fn clear_forced_response(&self) {
        self.state.lock().unwrap().forced = None;
    }

    pub fn insert_credential(&self, name: &str, info: Value) {
        self.state.lock().unwrap().credentials.insert(
            name.to_string(),
            json!({"credential_name": name, "credential_info": info}),
        );
    }

    pub fn model(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().models.get(id).cloned()
    }

    pub fn credential(&self, name: &str) -> Option<Value> {
        self.state.lock().unwrap().credentials.get(name).cloned()
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests with the given method and path.
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for FakeProxy {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Read policy with millisecond delays so tests run fast on the real clock.
pub fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        attempts,
        Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
    )
}

/// Address nothing is listening on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    listener.local_addr().unwrap()
}

// ============================================================================
// Handlers
// ============================================================================

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let forced = {
        let mut state = state.lock().unwrap();
        state.requests.push(Seen {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            authorization: request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
        state.forced.clone()
    };

    match forced {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => next.run(request).await,
    }
}

fn not_found(detail: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": {"error": detail}}))).into_response()
}

/// True when `id` must still read as absent; consumes one lagging read.
fn lagging(state: &mut ProxyState, id: &str) -> bool {
    match state.lag.get_mut(id) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

fn model_id(body: &Value) -> String {
    body.pointer("/model_info/id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn model_new(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let id = model_id(&body);
    let mut state = state.lock().unwrap();
    let lag = state.read_lag;
    state.lag.insert(id.clone(), lag);
    state.models.insert(id, body.clone());
    (StatusCode::OK, Json(body)).into_response()
}

async fn model_update(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let id = model_id(&body);
    let mut state = state.lock().unwrap();
    if !state.models.contains_key(&id) {
        return not_found("model_not_found");
    }
    state.models.insert(id, body.clone());
    (StatusCode::OK, Json(body)).into_response()
}

async fn model_info(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let id = query.get("litellm_model_id").cloned().unwrap_or_default();
    let mut state = state.lock().unwrap();
    if lagging(&mut state, &id) {
        return not_found("model_not_found");
    }
    match state.models.get(&id) {
        Some(model) => Json(json!({"data": [model]})).into_response(),
        None => not_found("model_not_found"),
    }
}

async fn model_delete(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let id = body["id"].as_str().unwrap_or_default().to_string();
    let mut state = state.lock().unwrap();
    match state.models.remove(&id) {
        Some(_) => Json(json!({"message": "deleted"})).into_response(),
        None => not_found("model_not_found"),
    }
}

async fn credential_create(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let name = body["credential_name"].as_str().unwrap_or_default().to_string();
    let mut state = state.lock().unwrap();
    let lag = state.read_lag;
    state.lag.insert(name.clone(), lag);
    state.credentials.insert(name, body);
    Json(json!({"success": true})).into_response()
}

async fn credential_update(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    if !state.credentials.contains_key(&name) {
        return not_found("credential_not_found");
    }
    state.credentials.insert(name, body);
    Json(json!({"success": true})).into_response()
}

async fn credential_read(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    if lagging(&mut state, &name) {
        return not_found("credential_not_found");
    }
    match state.credentials.get(&name) {
        Some(credential) => {
            // Secret values are never returned.
            Json(json!({
                "credential_name": credential["credential_name"],
                "credential_info": credential["credential_info"],
            }))
            .into_response()
        }
        None => not_found("credential_not_found"),
    }
}

async fn credential_delete(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    match state.credentials.remove(&name) {
        Some(_) => Json(json!({"success": true})).into_response(),
        None => not_found("credential_not_found"),
    }
}
