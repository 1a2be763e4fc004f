use crate::audit_client::AuditClient;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::AuditResults;
use crate::storage::Storage;
use crate::url_params;
use crate::wizard::{
    AnswerSubmission, DeepQuestionView, Prefill, SessionView, WizardOptions, WizardSession,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const MAX_SESSION_ID_LEN: usize = 128;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Backing store for every session's persisted answers.
    pub storage: Storage,
    pub client: AuditClient,
    pub options: WizardOptions,
    /// Live wizard sessions keyed by session id. Idle sessions expire; their
    /// persisted data does not.
    pub sessions: Cache<String, Arc<Mutex<WizardSession>>>,
}

impl AppState {
    pub fn new(config: Config, storage: Storage, client: AuditClient) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(Duration::from_secs(config.session_ttl_secs))
            .max_capacity(50_000)
            .build();

        Self {
            options: WizardOptions::from_config(&config),
            config,
            storage,
            client,
            sessions,
        }
    }

    async fn session(&self, id: &str) -> Result<Arc<Mutex<WizardSession>>, AppError> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Session {}", id)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest {
    /// Existing session to resume. A new id is issued when absent.
    pub session_id: Option<String>,
    /// The page's query string, used for attribution capture.
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JumpRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeepAnswerRequest {
    pub answer: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CtaRequest {
    /// Defaults to the report's `next_step.action`.
    #[serde(default)]
    pub action: Option<String>,
    /// Destination of the CTA link, echoed back with attribution appended.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaResponse {
    #[serde(flatten)]
    pub session: SessionView,
    pub redirect_url: Option<String>,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "growth-audit",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": state.storage.backend_name(),
            "activeSessions": state.sessions.entry_count(),
        })),
    )
}

/// POST /api/v1/sessions
///
/// Opens a session or resumes an existing one, capturing the page's URL
/// parameters either way.
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session_id = match request.session_id.filter(|id| !id.trim().is_empty()) {
        Some(id) if id.len() > MAX_SESSION_ID_LEN => {
            return Err(AppError::BadRequest("Session id is too long".to_string()));
        }
        Some(id) => id,
        None => Uuid::new_v4().to_string(),
    };
    tracing::info!("POST /sessions - session {}", session_id);

    let repo = state.storage.repository(&session_id).await;
    let current = url_params::parse_query(request.query.as_deref().unwrap_or_default());
    let merged = url_params::capture(&repo, &current).await;

    let session = state
        .sessions
        .get_with(session_id.clone(), async {
            Arc::new(Mutex::new(WizardSession::new(
                repo.clone(),
                state.client.clone(),
                state.options.clone(),
                merged.clone(),
            )))
        })
        .await;

    let mut session = session.lock().await;
    session.set_url_params(merged);
    Ok(Json(session.view().await))
}

/// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.session(&id).await?;
    let session = session.lock().await;
    Ok(Json(session.view().await))
}

/// POST /api/v1/sessions/:id/start
pub async fn start_audit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    tracing::info!("POST /sessions/{}/start", id);
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    session.start().await;
    Ok(Json(session.view().await))
}

/// POST /api/v1/sessions/:id/answer
///
/// Answers the current step. Validation errors return 400 and leave the
/// session where it was.
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(submission): Json<AnswerSubmission>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    session.submit_answer(submission).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/sessions/:id/back
pub async fn go_back(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    session.back().await;
    Ok(Json(session.view().await))
}

/// POST /api/v1/sessions/:id/jump
pub async fn jump_to_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<JumpRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    session.jump_to(request.index)?;
    Ok(Json(session.view().await))
}

/// GET /api/v1/sessions/:id/prefill
///
/// Waits for the website analysis and returns the current step's prefill.
/// The session lock is released before waiting; closing the connection
/// cancels the wait.
pub async fn prefill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Prefill>, AppError> {
    let session = state.session(&id).await?;
    let task = session.lock().await.prefill_task()?;
    Ok(Json(task.run().await))
}

/// GET /api/v1/sessions/:id/deep-questions
pub async fn deep_questions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeepQuestionView>>, AppError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    Ok(Json(session.load_deep_questions().await?))
}

/// PUT /api/v1/sessions/:id/deep-questions/:qid
pub async fn answer_deep_question(
    State(state): State<Arc<AppState>>,
    Path((id, question_id)): Path<(String, String)>,
    Json(request): Json<DeepAnswerRequest>,
) -> Result<StatusCode, AppError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    session
        .answer_deep_question(&question_id, &request.answer)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/finish
pub async fn finish_audit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AuditResults>, AppError> {
    tracing::info!("POST /sessions/{}/finish", id);
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    Ok(Json(session.finish().await?))
}

/// GET /api/v1/sessions/:id/results
pub async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AuditResults>, AppError> {
    let session = state.session(&id).await?;
    let session = session.lock().await;
    session
        .results()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Results for session {}", id)))
}

/// POST /api/v1/sessions/:id/cta
pub async fn record_cta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<CtaRequest>,
) -> Result<Json<CtaResponse>, AppError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    let redirect_url = session
        .record_cta(request.action, request.url.as_deref())
        .await?;
    Ok(Json(CtaResponse {
        session: session.view().await,
        redirect_url,
    }))
}

/// Session API routes, without middleware.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/sessions", post(open_session))
        .route("/api/v1/sessions/:id", get(get_session))
        .route("/api/v1/sessions/:id/start", post(start_audit))
        .route("/api/v1/sessions/:id/answer", post(submit_answer))
        .route("/api/v1/sessions/:id/back", post(go_back))
        .route("/api/v1/sessions/:id/jump", post(jump_to_step))
        .route("/api/v1/sessions/:id/prefill", get(prefill))
        .route("/api/v1/sessions/:id/deep-questions", get(deep_questions))
        .route(
            "/api/v1/sessions/:id/deep-questions/:qid",
            put(answer_deep_question),
        )
        .route("/api/v1/sessions/:id/finish", post(finish_audit))
        .route("/api/v1/sessions/:id/results", get(get_results))
        .route("/api/v1/sessions/:id/cta", post(record_cta))
}
