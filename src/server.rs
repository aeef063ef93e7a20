use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clusters::{ClusterRegistry, ClusterSummary};
use crate::config::AppConfig;
use crate::console::{Console, ConsoleAction};
use crate::error::{AssistantError, Result};
use crate::models::{self, InferenceService, ModelSummary};
use crate::prompt::ClusterContext;
use crate::session::{ConversationState, Message, SessionSummary};
use crate::settings::{
    resolve_effective_settings, EffectiveSettings, ModelParams, ModelSettings, RequestOverrides,
};
use crate::suggestions::{StarterPrompt, STARTER_PROMPTS};

#[derive(Clone)]
pub struct AppState {
    pub consoles: Arc<RwLock<HashMap<Uuid, Console>>>,
    pub config: Arc<AppConfig>,
    pub inference: Arc<dyn InferenceService>,
    pub clusters: Arc<dyn ClusterRegistry>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        inference: Arc<dyn InferenceService>,
        clusters: Arc<dyn ClusterRegistry>,
    ) -> Self {
        Self {
            consoles: Arc::default(),
            config: Arc::new(config),
            inference,
            clusters,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    async fn console(&self, id: Uuid) -> Result<Console> {
        let consoles = self.consoles.read().await;
        consoles.get(&id).cloned().ok_or(AssistantError::ConsoleNotFound(id))
    }

    /// Runs `f` against the stored console and swaps in the result on success.
    async fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&Console) -> Result<(Console, T)>,
    ) -> Result<(Console, T)> {
        let mut consoles = self.consoles.write().await;
        let current = consoles.get(&id).ok_or(AssistantError::ConsoleNotFound(id))?;
        let (next, out) = f(current)?;
        consoles.insert(id, next.clone());
        Ok((next, out))
    }

    async fn apply(&self, id: Uuid, action: ConsoleAction) -> Result<Console> {
        let (next, ()) = self.update(id, |c| Ok((c.apply(action)?, ()))).await?;
        Ok(next)
    }
}

#[derive(Debug, Serialize)]
pub struct ConsoleView {
    pub id: Uuid,
    pub state: ConversationState,
    pub messages: Vec<Message>,
    pub message_count: usize,
    pub sessions: Vec<SessionSummary>,
    pub session_count: usize,
    pub model: ModelSettings,
    pub effective: EffectiveSettings,
    pub cluster: Option<ClusterContext>,
}

impl ConsoleView {
    fn new(id: Uuid, console: &Console, config: &AppConfig) -> Self {
        Self {
            id,
            state: console.conversation.state(),
            messages: console.conversation.messages().to_vec(),
            message_count: console.conversation.len(),
            sessions: console.sessions.summaries(None),
            session_count: console.sessions.len(),
            model: console.model.clone(),
            effective: resolve_effective_settings(
                &config.defaults,
                &console.model,
                &RequestOverrides::default(),
            ),
            cluster: console.cluster.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateConsoleResponse {
    pub id: Uuid,
}

async fn create_console(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateConsoleResponse>) {
    let id = Uuid::new_v4();
    state.consoles.write().await.insert(id, Console::new());
    tracing::info!(console = %id, "console created");
    (StatusCode::CREATED, Json(CreateConsoleResponse { id }))
}

#[derive(Debug, Serialize)]
pub struct ListConsolesResponse {
    pub consoles: Vec<Uuid>,
}

async fn list_consoles(State(state): State<AppState>) -> Json<ListConsolesResponse> {
    let consoles = state.consoles.read().await.keys().copied().collect();
    Json(ListConsolesResponse { consoles })
}

async fn get_console(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConsoleView>> {
    let console = state.console(id).await?;
    Ok(Json(ConsoleView::new(id, &console, &state.config)))
}

async fn close_console(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.consoles.write().await.remove(&id).ok_or(AssistantError::ConsoleNotFound(id))?;
    tracing::info!(console = %id, "console closed");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_params: Option<ModelParams>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub reply: String,
    pub model: String,
}

async fn ask(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>> {
    let snapshot = state.console(id).await?;
    let overrides = RequestOverrides { model: body.model, model_params: body.model_params };
    let request = snapshot.prepare_request(&body.text, &overrides, &state.config)?;

    let response = match models::generate(state.inference.as_ref(), &request).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(console = %id, model = %request.model, error = %e, "model call failed");
            return Err(e);
        }
    };

    state
        .apply(
            id,
            ConsoleAction::RecordExchange {
                user: body.text,
                reply: response.content.clone(),
                model: response.model.clone(),
            },
        )
        .await?;
    tracing::info!(console = %id, model = %response.model, "exchange recorded");
    Ok(Json(AskResponse { reply: response.content, model: response.model }))
}

#[derive(Debug, Serialize)]
pub struct NewConversationResponse {
    pub archived_session: Option<u64>,
}

async fn new_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NewConversationResponse>> {
    let action = ConsoleAction::StartNewConversation { at: Utc::now() };
    let (_, archived_session) = state
        .update(id, |current| {
            let next = current.apply(action)?;
            // Archiving puts the new session at the front of the store.
            let archived = (next.sessions.len() > current.sessions.len())
                .then(|| next.sessions.sessions().first().map(|s| s.id))
                .flatten();
            Ok((next, archived))
        })
        .await?;
    Ok(Json(NewConversationResponse { archived_session }))
}

async fn discard_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.apply(id, ConsoleAction::DiscardConversation).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>> {
    let console = state.console(id).await?;
    Ok(Json(ListSessionsResponse { sessions: console.sessions.summaries(q.limit) }))
}

async fn restore_session(
    State(state): State<AppState>,
    Path((id, session)): Path<(Uuid, u64)>,
) -> Result<Json<ConsoleView>> {
    let console = state.apply(id, ConsoleAction::RestoreSession { id: session }).await?;
    Ok(Json(ConsoleView::new(id, &console, &state.config)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path((id, session)): Path<(Uuid, u64)>,
) -> Result<StatusCode> {
    state.apply(id, ConsoleAction::DeleteSession { id: session }).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_sessions(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.apply(id, ConsoleAction::ClearAllSessions).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SelectClusterBody {
    pub name: Option<String>,
}

async fn select_cluster(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectClusterBody>,
) -> Result<Json<ConsoleView>> {
    state.console(id).await?;
    let context = match body.name {
        Some(name) => Some(state.clusters.describe_cluster(&name).await?.context()),
        None => None,
    };
    let console = state.apply(id, ConsoleAction::SelectCluster(context)).await?;
    Ok(Json(ConsoleView::new(id, &console, &state.config)))
}

#[derive(Debug, Deserialize)]
pub struct SelectModelBody {
    pub model_id: String,
}

async fn select_model(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectModelBody>,
) -> Result<Json<ConsoleView>> {
    let console = state.apply(id, ConsoleAction::SelectModel(body.model_id)).await?;
    Ok(Json(ConsoleView::new(id, &console, &state.config)))
}

async fn update_params(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ModelParams>,
) -> Result<Json<ConsoleView>> {
    let console = state.apply(id, ConsoleAction::UpdateParams(patch)).await?;
    Ok(Json(ConsoleView::new(id, &console, &state.config)))
}

#[derive(Debug, Serialize)]
pub struct ListClustersResponse {
    pub clusters: Vec<ClusterSummary>,
}

async fn list_clusters(State(state): State<AppState>) -> Result<Json<ListClustersResponse>> {
    let clusters = state.clusters.list_clusters().await?;
    Ok(Json(ListClustersResponse { clusters }))
}

#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<ModelSummary>,
}

async fn list_models(State(state): State<AppState>) -> Result<Json<ListModelsResponse>> {
    let all = state.inference.list_models().await?;
    let models = models::text_models(all, &state.config.excluded_models);
    Ok(Json(ListModelsResponse { models }))
}

async fn suggestions() -> Json<&'static [StarterPrompt]> {
    Json(STARTER_PROMPTS)
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/v1/clusters", get(list_clusters))
        .route("/v1/models", get(list_models))
        .route("/v1/suggestions", get(suggestions))
        .route("/v1/consoles", post(create_console).get(list_consoles))
        .route("/v1/consoles/:id", get(get_console).delete(close_console))
        .route("/v1/consoles/:id/ask", post(ask))
        .route("/v1/consoles/:id/conversation", delete(discard_conversation))
        .route("/v1/consoles/:id/conversation/new", post(new_conversation))
        .route("/v1/consoles/:id/sessions", get(list_sessions).delete(clear_sessions))
        .route("/v1/consoles/:id/sessions/:session", delete(delete_session))
        .route("/v1/consoles/:id/sessions/:session/restore", post(restore_session))
        .route("/v1/consoles/:id/cluster", put(select_cluster))
        .route("/v1/consoles/:id/model", put(select_model))
        .route("/v1/consoles/:id/params", patch(update_params))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
