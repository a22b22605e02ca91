//! JSON HTTP API over workspaces.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::ingest::{DataSourceRegistry, SourceOptions};
use crate::workspace::{Workspace, WorkspaceService, WorkspaceStore};

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    workspaces: Arc<Mutex<WorkspaceService>>,
    registry: Arc<DataSourceRegistry>,
    store: Option<WorkspaceStore>,
}

impl AppState {
    pub fn new(
        service: WorkspaceService,
        registry: DataSourceRegistry,
        store: Option<WorkspaceStore>,
    ) -> Self {
        Self {
            workspaces: Arc::new(Mutex::new(service)),
            registry: Arc::new(registry),
            store,
        }
    }

    /// Write the workspace through to the store, if there is one.
    async fn persist(&self, workspace: &Workspace) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(workspace).await?;
        }
        Ok(())
    }
}

/// HTTP API server
pub struct ApiServer {
    state: AppState,
    config: Config,
}

impl ApiServer {
    /// Open the workspace store and restore saved workspaces.
    pub async fn new(config: Config) -> Result<Self> {
        let store = WorkspaceStore::open(config.workspace_db()).await?;
        let mut service = WorkspaceService::new(config.explorer.default_visualizer.clone());
        let saved = store.load_all().await?;
        log::info!("Restored {} workspaces", saved.len());
        service.restore(saved);

        let registry = DataSourceRegistry::new(&config);
        Ok(Self {
            state: AppState::new(service, registry, Some(store)),
            config,
        })
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let addr = format!("{}:{}", self.config.http_server.host, port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            GraphError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;
        log::info!("Starting HTTP API on http://{}", addr);

        let app = create_router(self.state.clone(), &self.config.http_server.allowed_origins);
        axum::serve(listener, app)
            .await
            .map_err(|e| {
                GraphError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("HTTP server error: {}", e),
                ))
            })?;
        Ok(())
    }
}

/// Create the axum router
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/data-sources", get(handle_data_sources))
        .route("/api/workspaces", get(handle_list).post(handle_create))
        .route("/api/workspaces/:id", get(handle_get))
        .route("/api/workspaces/:id/select", post(handle_select))
        .route("/api/workspaces/:id/rename", post(handle_rename))
        .route("/api/workspaces/:id/load", post(handle_load))
        .route("/api/workspaces/:id/query", post(handle_query))
        .route("/api/workspaces/:id/filters/:index", delete(handle_remove_filter))
        .route("/api/workspaces/:id/reset", post(handle_reset))
        .route("/api/workspaces/:id/visualizer", post(handle_visualizer))
        .route("/api/workspaces/:id/command", post(handle_command))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Error body `{"error": message}` with a status derived from the error kind
struct ApiError(GraphError);

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GraphError::NotFound(_) | GraphError::WorkspaceNotFound(_) => StatusCode::NOT_FOUND,
            GraphError::InvalidInput(_)
            | GraphError::InvalidOptions(_)
            | GraphError::TypeMismatch { .. }
            | GraphError::MalformedSource { .. }
            | GraphError::Turtle(_)
            | GraphError::UnsupportedSource(_)
            | GraphError::Command(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {}", self.0);
        } else {
            log::debug!("Request rejected: {}", self.0);
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Listing entry of a workspace
#[derive(Debug, Serialize)]
struct WorkspaceSummary {
    id: String,
    name: String,
    current: bool,
    data_source: Option<String>,
    visualizer: String,
    node_count: usize,
    link_count: usize,
    visible_node_count: usize,
    applied_filters: Vec<String>,
}

impl WorkspaceSummary {
    fn of(ws: &Workspace, current: bool) -> Self {
        Self {
            id: ws.id.clone(),
            name: ws.name.clone(),
            current,
            data_source: ws.current_data_source_id.clone(),
            visualizer: ws.current_visualizer_id.clone(),
            node_count: ws.graph().node_count(),
            link_count: ws.graph().link_count(),
            visible_node_count: ws.filtered_graph().node_count(),
            applied_filters: ws.applied_filters().iter().map(|q| q.to_string()).collect(),
        }
    }
}

fn summary(service: &WorkspaceService, ws: &Workspace) -> WorkspaceSummary {
    let current = service.current().map(|c| c.id == ws.id).unwrap_or(false);
    WorkspaceSummary::of(ws, current)
}

/// Summary plus the current view, returned by operations that change it
fn view_response(service: &WorkspaceService, ws: &Workspace) -> JsonValue {
    json!({
        "workspace": summary(service, ws),
        "filtered_graph": ws.filtered_graph().to_dict(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct CreateRequest {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LoadRequest {
    source: String,
    data_source: Option<String>,
    #[serde(default)]
    options: SourceOptions,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    expression: String,
}

#[derive(Debug, Deserialize)]
struct VisualizerRequest {
    visualizer: String,
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "graph-explorer",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_data_sources(State(state): State<AppState>) -> Json<JsonValue> {
    let sources: Vec<JsonValue> = state
        .registry
        .sources()
        .map(|s| {
            json!({
                "id": s.id(),
                "name": s.name(),
                "extensions": s.supported_extensions(),
                "parameters": s.parameters(),
            })
        })
        .collect();
    Json(json!({ "data_sources": sources }))
}

async fn handle_list(State(state): State<AppState>) -> Json<JsonValue> {
    let service = state.workspaces.lock().await;
    let workspaces: Vec<WorkspaceSummary> = service
        .list()
        .iter()
        .map(|ws| summary(&service, ws))
        .collect();
    Json(json!({
        "workspaces": workspaces,
        "current": service.current().map(|ws| ws.id.clone()),
    }))
}

async fn handle_create(
    State(state): State<AppState>,
    body: Option<Json<CreateRequest>>,
) -> ApiResult<(StatusCode, Json<WorkspaceSummary>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let mut service = state.workspaces.lock().await;
    let ws = service.create(None, request.name).clone();
    state.persist(&ws).await?;
    Ok((StatusCode::CREATED, Json(summary(&service, &ws))))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let service = state.workspaces.lock().await;
    Ok(Json(service.get(&id)?.clone()))
}

async fn handle_select(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceSummary>> {
    let mut service = state.workspaces.lock().await;
    service.select(&id)?;
    let ws = service.get(&id)?;
    Ok(Json(summary(&service, ws)))
}

async fn handle_rename(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<Json<WorkspaceSummary>> {
    let mut service = state.workspaces.lock().await;
    service.rename(&id, &request.name)?;
    let ws = service.get(&id)?.clone();
    state.persist(&ws).await?;
    Ok(Json(summary(&service, &ws)))
}

async fn handle_load(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<LoadRequest>,
) -> ApiResult<Json<JsonValue>> {
    // fail fast before reading the source
    state.workspaces.lock().await.get(&id)?;

    let registry = Arc::clone(&state.registry);
    let (data_source_id, graph) = tokio::task::spawn_blocking(move || {
        let data_source = registry.resolve(&request.source, request.data_source.as_deref())?;
        let graph = data_source.load_data(&request.source, &request.options)?;
        Ok::<_, GraphError>((data_source.id().to_string(), graph))
    })
    .await
    .map_err(|e| GraphError::InvalidInput(format!("load task failed: {}", e)))??;

    let mut service = state.workspaces.lock().await;
    let ws = service.get_mut(&id)?;
    ws.load_graph(graph, Some(data_source_id));
    let ws = ws.clone();
    state.persist(&ws).await?;
    Ok(Json(view_response(&service, &ws)))
}

async fn handle_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<JsonValue>> {
    let mut service = state.workspaces.lock().await;
    let ws = service.get_mut(&id)?;
    let applied = ws.apply_expression(&request.expression)?;
    let ws = ws.clone();
    if applied {
        state.persist(&ws).await?;
    }
    let mut body = view_response(&service, &ws);
    body["applied"] = JsonValue::Bool(applied);
    Ok(Json(body))
}

async fn handle_remove_filter(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Json<JsonValue>> {
    let mut service = state.workspaces.lock().await;
    let ws = service.get_mut(&id)?;
    let removed = ws.remove_filter(index)?;
    let ws = ws.clone();
    state.persist(&ws).await?;
    let mut body = view_response(&service, &ws);
    body["removed"] = JsonValue::String(removed.to_string());
    Ok(Json(body))
}

async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let mut service = state.workspaces.lock().await;
    let ws = service.get_mut(&id)?;
    ws.reset();
    let ws = ws.clone();
    state.persist(&ws).await?;
    Ok(Json(view_response(&service, &ws)))
}

async fn handle_visualizer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VisualizerRequest>,
) -> ApiResult<Json<WorkspaceSummary>> {
    let visualizer = request.visualizer.trim();
    if visualizer.is_empty() {
        return Err(GraphError::InvalidInput("visualizer must not be empty".to_string()).into());
    }
    let mut service = state.workspaces.lock().await;
    let ws = service.get_mut(&id)?;
    ws.current_visualizer_id = visualizer.to_string();
    let ws = ws.clone();
    state.persist(&ws).await?;
    Ok(Json(summary(&service, &ws)))
}

async fn handle_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<JsonValue>> {
    let mut service = state.workspaces.lock().await;
    let ws = service.get_mut(&id)?;
    let message = ws.run_command(&request.command)?;
    let ws = ws.clone();
    state.persist(&ws).await?;
    let mut body = view_response(&service, &ws);
    body["message"] = JsonValue::String(message);
    Ok(Json(body))
}
