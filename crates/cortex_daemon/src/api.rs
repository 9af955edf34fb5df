use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use cortex_core::agent::prompts::{json_field, text_field, CognitiveRequest, TranslateRequest};
use cortex_core::archive::ArchivedMemory;
use cortex_core::orchestrator::surface_user_text;
use cortex_core::{
    AgentClient, CognitiveOutput, CycleOrchestrator, CycleReport, CycleState, TranslatorOutput,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing::{debug, error, info};

use crate::supervisor::{self, HeartbeatSnapshot, HeartbeatStats};

#[derive(Clone)]
pub struct AppState {
    agent: Arc<AgentClient>,
    orchestrator: Arc<CycleOrchestrator>,
    heartbeat: Arc<HeartbeatStats>,
    tick_interval: Duration,
}

impl AppState {
    pub fn new(
        agent: Arc<AgentClient>,
        orchestrator: Arc<CycleOrchestrator>,
        heartbeat: Arc<HeartbeatStats>,
        tick_interval: Duration,
    ) -> Self {
        AppState {
            agent,
            orchestrator,
            heartbeat,
            tick_interval,
        }
    }
}

// Response types
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    heartbeat: HeartbeatSnapshot,
    last_cycle_state: CycleState,
    archive_size: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CycleErrorResponse {
    error: String,
    failed_in: CycleState,
    partial_mutation: bool,
}

#[derive(Deserialize)]
pub struct ArchiveQuery {
    limit: Option<usize>,
}

/// Parse a JSON body, treating an empty or malformed one as `{}`.
/// Fields are then read one by one, so a mistyped field only loses itself.
fn body_json(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        debug!(error = %e, bytes = body.len(), "Malformed request body, using {{}}");
        Value::Object(Default::default())
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn translate(State(state): State<AppState>, body: Bytes) -> Json<TranslatorOutput> {
    let request = TranslateRequest::from_value(&body_json(&body));
    let (output, reply) = state.agent.translate(&request).await;
    info!(
        source = ?reply.source,
        neural_inputs = output.neural_inputs.len(),
        neurogenesis = output.neurogenesis.len(),
        "translate served"
    );
    Json(output)
}

async fn cognitive(State(state): State<AppState>, body: Bytes) -> Json<CognitiveOutput> {
    let request = CognitiveRequest::from_value(&body_json(&body));
    let (mut output, reply) = state.agent.interpret(&request).await;
    info!(
        source = ?reply.source,
        has_user_text = output.user_text.is_some(),
        "cognitive served"
    );
    if output.user_text.is_none() {
        output.user_text = Some(surface_user_text(&output, &reply.value));
    }
    Json(output)
}

async fn run_cycle(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CycleReport>, (StatusCode, Json<CycleErrorResponse>)> {
    let body = body_json(&body);
    let user_text = text_field(&body, "user_text");
    let sensory_snapshot = json_field(&body, "sensory_snapshot");
    match state
        .orchestrator
        .run_cycle(&user_text, &sensory_snapshot)
        .await
    {
        Ok(report) => Ok(Json(report)),
        Err(failure) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CycleErrorResponse {
                error: failure.to_string(),
                failed_in: failure.failed_in,
                partial_mutation: failure.partial_mutation,
            }),
        )),
    }
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        heartbeat: supervisor::snapshot(&state.heartbeat, state.tick_interval),
        last_cycle_state: state.orchestrator.last_state(),
        archive_size: state.orchestrator.archive_len(),
    })
}

async fn get_archive(
    State(state): State<AppState>,
    Query(query): Query<ArchiveQuery>,
) -> Json<Vec<ArchivedMemory>> {
    Json(state.orchestrator.archived(query.limit.unwrap_or(50)))
}

/// Uncaught handler panics become `500 {error}`.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(detail = %detail, "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: detail }),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/translate", post(translate))
        .route("/cognitive", post(cognitive))
        .route("/cycle", post(run_cycle))
        .route("/status", get(get_status))
        .route("/archive", get(get_archive))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
}

pub async fn run_api_server(
    state: AppState,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cortex_core::agent::backend::{ChatRequest, CompletionBackend};
    use cortex_core::reservoir::{self, RecordingReservoir};
    use cortex_core::{AgentProfiles, AgentRole, CortexError};
    use serde_json::json;
    use std::sync::Mutex;

    /// Agent tier answers with a fixed text per role; `None` means unreachable.
    #[derive(Default)]
    struct Fixed {
        translator: Option<&'static str>,
        cognitive: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionBackend for Fixed {
        async fn invoke_agent(
            &self,
            _agent_id: &str,
            input: &str,
            role: AgentRole,
        ) -> cortex_core::Result<Value> {
            self.prompts.lock().unwrap().push(input.to_string());
            let text = match role {
                AgentRole::Translator => self.translator,
                AgentRole::Cognitive => self.cognitive,
            };
            text.map(|t| json!({ "output": [{ "content": t }] }))
                .ok_or_else(|| CortexError::Network("down".to_string()))
        }

        async fn chat_completion(&self, _request: &ChatRequest) -> cortex_core::Result<Value> {
            Err(CortexError::Network("down".to_string()))
        }
    }

    fn state_with(backend: Fixed, engine: RecordingReservoir) -> AppState {
        state_over(Arc::new(backend), engine)
    }

    fn state_over(backend: Arc<Fixed>, engine: RecordingReservoir) -> AppState {
        let agent = Arc::new(AgentClient::new(backend, AgentProfiles::default()));
        let orchestrator = Arc::new(CycleOrchestrator::new(agent.clone(), reservoir::share(engine)));
        AppState::new(
            agent,
            orchestrator,
            Arc::new(HeartbeatStats::default()),
            Duration::from_millis(1000),
        )
    }

    fn offline() -> Fixed {
        Fixed::default()
    }

    #[tokio::test]
    async fn test_translate_empty_body_returns_empty_arrays() {
        let state = state_with(offline(), RecordingReservoir::new("{}"));
        let Json(out) = translate(State(state), Bytes::new()).await;
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"neural_inputs": [], "neurogenesis": [], "memory_flags": []})
        );
    }

    #[tokio::test]
    async fn test_translate_malformed_body_is_still_200() {
        let state = state_with(offline(), RecordingReservoir::new("{}"));
        let response = translate(State(state), Bytes::from_static(b"not json"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_translate_normalizes_agent_reply() {
        let backend = Fixed {
            translator: Some(
                r#"ok: {"neural_inputs":[{"kind":"sensory_stim","receptor":"touch","intensity":0.4}],"extra":1}"#,
            ),
            ..Default::default()
        };
        let state = state_with(backend, RecordingReservoir::new("{}"));
        let body = Bytes::from_static(br#"{"user_text":"poke"}"#);
        let Json(out) = translate(State(state), body).await;
        assert_eq!(out.neural_inputs.len(), 1);
        assert!(out.memory_flags.is_empty());
    }

    #[tokio::test]
    async fn test_translate_null_user_text_keeps_snapshot() {
        let backend = Arc::new(Fixed::default());
        let state = state_over(backend.clone(), RecordingReservoir::new("{}"));
        let body = Bytes::from_static(
            br#"{"user_text":null,"sensory_snapshot":{"force":0.9},"short_brain_summary":{"arousal":0.2}}"#,
        );

        let response = translate(State(state), body).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains(r#"{"force":0.9}"#));
        assert!(prompts[0].contains(r#"{"arousal":0.2}"#));
    }

    #[tokio::test]
    async fn test_cycle_mistyped_text_keeps_snapshot() {
        let backend = Arc::new(Fixed::default());
        let state = state_over(backend.clone(), RecordingReservoir::new("{}"));
        let body = Bytes::from_static(br#"{"user_text":7,"sensory_snapshot":{"touch":"hard"}}"#);

        assert!(run_cycle(State(state), body).await.is_ok());
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains(r#"{"touch":"hard"}"#));
    }

    #[tokio::test]
    async fn test_cognitive_without_user_text_surfaces_raw_reply() {
        let backend = Fixed {
            cognitive: Some(r#"{"behavior_directives":{"verbal_tone":"calm"}}"#),
            ..Default::default()
        };
        let state = state_with(backend, RecordingReservoir::new("{}"));
        let Json(out) = cognitive(State(state), Bytes::new()).await;

        assert_eq!(
            out.user_text.as_deref(),
            Some(r#"{"behavior_directives":{"verbal_tone":"calm"}}"#)
        );
        let wire = serde_json::to_value(&out).unwrap();
        assert!(wire["user_text"].is_string());
        assert_eq!(wire["behavior_directives"]["verbal_tone"], "calm");
    }

    #[tokio::test]
    async fn test_cognitive_default_when_agents_down() {
        let state = state_with(offline(), RecordingReservoir::new("{}"));
        let body = Bytes::from_static(br#"{"post_brain_summary":{"valence":0.1},"recent_user_text":"hi"}"#);
        let Json(out) = cognitive(State(state), body).await;
        assert_eq!(out.user_text.as_deref(), Some("(error) couldn't generate response"));
        assert!(out.behavior_directives.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_failure_maps_to_500() {
        let mut engine = RecordingReservoir::new("{}");
        engine.fail_step_at = Some(1);
        let state = state_with(offline(), engine);

        let Err((code, Json(body))) = run_cycle(State(state.clone()), Bytes::new()).await else {
            panic!("failed cycle must not be 200");
        };
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.failed_in, CycleState::Stepping);
        assert!(body.partial_mutation);

        let Json(status) = get_status(State(state)).await;
        assert_eq!(status.last_cycle_state, CycleState::Failed);
    }

    #[tokio::test]
    async fn test_cycle_success_archives_memories() {
        let backend = Fixed {
            translator: Some(r#"{"memory_flags":[{"summary":"poked","importance":0.3}]}"#),
            cognitive: Some(r#"{"user_text":"ouch"}"#),
            ..Default::default()
        };
        let state = state_with(backend, RecordingReservoir::new(r#"{"valence":0.0}"#));
        let body = Bytes::from_static(br#"{"user_text":"poke","sensory_snapshot":{"touch":1}}"#);

        let Ok(Json(report)) = run_cycle(State(state.clone()), body).await else {
            panic!("cycle should succeed");
        };
        assert_eq!(report.user_text, "ouch");

        let Json(archived) =
            get_archive(State(state.clone()), Query(ArchiveQuery { limit: None })).await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].summary, "poked");

        let Json(status) = get_status(State(state)).await;
        assert_eq!(status.archive_size, 1);
        assert_eq!(status.last_cycle_state, CycleState::Idle);
    }

    #[test]
    fn test_panic_response_is_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
