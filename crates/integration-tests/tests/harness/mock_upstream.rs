//! Mock OpenRouter-style upstream
//!
//! Serves chat completions, the model catalog and the generation lookup
//! that carries billed usage. Failures and lookup availability are
//! scriptable while the server runs.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

pub const INPUT_TOKENS: u64 = 12;
pub const OUTPUT_TOKENS: u64 = 8;

pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    name: String,
    models: Vec<String>,
    completions: AtomicU32,
    lookups: AtomicU32,
    script: Mutex<Script>,
}

struct Script {
    /// Status to answer the next `remaining` completions with
    failure: Option<(StatusCode, u32)>,
    /// Billed cost served by the generation lookup; `None` keeps it pending
    billed_cost: Option<String>,
    /// Normalized cost reported inline with the completion
    inline_cost: String,
    /// Generation id -> model that produced it
    generations: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerationQuery {
    id: String,
}

impl MockUpstream {
    /// Start an upstream offering `models`, billing each call at `billed_cost`
    pub async fn start(name: &str, models: &[&str], billed_cost: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            name: name.to_owned(),
            models: models.iter().map(ToString::to_string).collect(),
            completions: AtomicU32::new(0),
            lookups: AtomicU32::new(0),
            script: Mutex::new(Script {
                failure: None,
                billed_cost: Some(billed_cost.to_owned()),
                inline_cost: billed_cost.to_owned(),
                generations: HashMap::new(),
            }),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_completion))
            .route("/v1/models", routing::get(handle_models))
            .route("/v1/generation", routing::get(handle_generation))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Answer the next `times` completions with `status`
    pub fn fail_next(&self, status: u16, times: u32) {
        let status = StatusCode::from_u16(status).expect("valid status");
        self.script().failure = Some((status, times));
    }

    /// Answer every completion with `status`
    pub fn fail_always(&self, status: u16) {
        self.fail_next(status, u32::MAX);
    }

    /// Keep generation lookups pending forever
    pub fn withhold_usage(&self) {
        self.script().billed_cost = None;
    }

    /// Cost reported inline, distinct from what the lookup bills
    pub fn set_inline_cost(&self, cost: &str) {
        self.script().inline_cost = cost.to_owned();
    }

    pub fn completion_count(&self) -> u32 {
        self.state.completions.load(Ordering::Relaxed)
    }

    pub fn lookup_count(&self) -> u32 {
        self.state.lookups.load(Ordering::Relaxed)
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.state.script.lock().expect("script lock")
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_completion(State(state): State<Arc<MockState>>, Json(request): Json<CompletionRequest>) -> Response {
    let n = state.completions.fetch_add(1, Ordering::Relaxed) + 1;
    let mut script = state.script.lock().expect("script lock");

    if let Some((status, remaining)) = script.failure {
        script.failure = (remaining > 1).then(|| (status, remaining.saturating_sub(1)));
        let id = format!("gen-{}-failed-{n}", state.name);
        return (status, Json(serde_json::json!({ "id": id, "error": { "message": "scripted failure" } })))
            .into_response();
    }

    if !state.models.contains(&request.model) {
        return (StatusCode::NOT_FOUND, "model not found").into_response();
    }

    let id = format!("gen-{}-{n}", state.name);
    script.generations.insert(id.clone(), request.model.clone());

    Json(serde_json::json!({
        "id": id,
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": format!("Hello from {}", state.name) },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": INPUT_TOKENS,
            "completion_tokens": OUTPUT_TOKENS,
            "cost": script.inline_cost.parse::<f64>().unwrap_or_default()
        }
    }))
    .into_response()
}

async fn handle_models(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    let data: Vec<_> = state
        .models
        .iter()
        .map(|id| serde_json::json!({ "id": id, "object": "model" }))
        .collect();
    Json(serde_json::json!({ "object": "list", "data": data }))
}

async fn handle_generation(
    State(state): State<Arc<MockState>>,
    Query(query): Query<GenerationQuery>,
) -> Response {
    state.lookups.fetch_add(1, Ordering::Relaxed);
    let script = state.script.lock().expect("script lock");

    let (Some(cost), true) = (&script.billed_cost, script.generations.contains_key(&query.id)) else {
        return (StatusCode::NOT_FOUND, "generation not found").into_response();
    };

    Json(serde_json::json!({
        "data": {
            "id": query.id,
            "native_tokens_prompt": INPUT_TOKENS + 3,
            "native_tokens_completion": OUTPUT_TOKENS,
            "total_cost": cost.parse::<f64>().unwrap_or_default()
        }
    }))
    .into_response()
}
