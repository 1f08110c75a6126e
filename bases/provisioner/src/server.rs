// bases/provisioner/src/server.rs
use crate::workspace::{OpenResult, Workspace};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use deployment::{Orchestrator, ProvisioningEvent};
use futures::Stream;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use settings_store::{Settings, SettingsStore};
use solution_model::Solution;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::info;

/// Shared across handlers; the workspace lock doubles as the one-run guard
///
/// `snapshot` mirrors the open solution so reads never wait on a run.
#[derive(Clone)]
struct AppState {
    workspace: Arc<Mutex<Workspace>>,
    snapshot: Arc<RwLock<Solution>>,
    orchestrator: Arc<Orchestrator>,
    settings: Arc<dyn SettingsStore>,
}

impl AppState {
    fn new(workspace: Workspace, orchestrator: Orchestrator, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(workspace.solution().clone())),
            workspace: Arc::new(Mutex::new(workspace)),
            orchestrator: Arc::new(orchestrator),
            settings,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenRequest {
    path: Option<PathBuf>,
}

/// Run the HTTP surface until the process is stopped
pub async fn run(
    workspace: Workspace,
    orchestrator: Orchestrator,
    settings: Arc<dyn SettingsStore>,
    port: u16,
) -> color_eyre::Result<()> {
    let state = AppState::new(workspace, orchestrator, settings);

    let app = Router::new()
        .route("/solution", get(solution))
        .route("/open", post(open))
        .route("/provision", post(provision))
        .route("/settings", get(current_settings))
        .route("/events", get(events))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Provisioner listening on http://localhost:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn solution(State(state): State<AppState>) -> Json<Solution> {
    Json(state.snapshot.read().clone())
}

async fn open(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> Result<Json<OpenResult>, AppError> {
    let mut workspace = state.workspace.try_lock().map_err(|_| AppError::Busy)?;
    let result = workspace.open(request.path.as_deref()).await;
    *state.snapshot.write() = workspace.solution().clone();
    Ok(Json(result))
}

async fn current_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.load())
}

/// Start a run in the background; progress is followed on `/events`
async fn provision(State(state): State<AppState>) -> Result<Response, AppError> {
    let mut workspace = state
        .workspace
        .clone()
        .try_lock_owned()
        .map_err(|_| AppError::Busy)?;
    if workspace.solution().is_empty() {
        return Err(AppError::NothingOpen);
    }

    let orchestrator = state.orchestrator.clone();
    let snapshot = state.snapshot.clone();
    tokio::spawn(async move {
        let result = workspace
            .provision(&orchestrator, |event| mirror(&snapshot, event))
            .await;
        *snapshot.write() = workspace.solution().clone();
        match result {
            Ok(outcome) => match outcome.failure {
                None => info!(completed = outcome.completed, "provisioning completed"),
                Some(error) => tracing::warn!(%error, "provisioning stopped"),
            },
            Err(e) => tracing::error!(error = %e, "provisioning did not start"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "started": true }))).into_response())
}

/// Apply a saved result to the readable copy of the solution
fn mirror(snapshot: &RwLock<Solution>, event: &ProvisioningEvent) {
    if let ProvisioningEvent::ItemResultSaved { item_id, response } = event {
        snapshot
            .write()
            .record_provision_response(item_id, response.clone());
    }
}

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = state.orchestrator.subscribe();

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => match Event::default().json_data(&event) {
                    Ok(sse) => yield Ok(sse),
                    Err(e) => tracing::warn!(error = %e, "could not encode event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Errors for HTTP handlers
#[derive(Debug)]
enum AppError {
    Busy,
    NothingOpen,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Busy => (StatusCode::CONFLICT, "a provisioning run is in progress"),
            AppError::NothingOpen => (StatusCode::BAD_REQUEST, "no solution is open"),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
