use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::result::CellValue;
use crate::export;
use crate::history::HistoryEntry;
use crate::pipeline::{AskError, AskOutcome, AskStatus};
use crate::session::{SessionRecord, SharedSession};
use crate::web::state::AppState;

pub const MIN_DISPLAY_ROWS: usize = 5;
pub const MAX_DISPLAY_ROWS: usize = 100;

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const DATABASE_EXTENSIONS: [&str; 3] = ["sqlite", "sqlite3", "db"];

// Error body shared by every endpoint

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                kind,
                sql: None,
            },
        }
    }

    fn session_not_found(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "session_not_found", format!("Session '{}' not found", id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AskError> for ApiError {
    fn from(err: AskError) -> Self {
        let message = err.to_string();
        match err {
            AskError::EmptyQuestion => Self::new(StatusCode::BAD_REQUEST, "empty_question", message),
            AskError::PromptUnavailable(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "prompt_unavailable", message)
            }
            AskError::Translation(_) => Self::new(StatusCode::BAD_GATEWAY, "translation_error", message),
            AskError::Execution { sql, .. } => {
                let mut api_error = Self::new(StatusCode::UNPROCESSABLE_ENTITY, "execution_error", message);
                api_error.body.sql = Some(sql);
                api_error
            }
        }
    }
}

// Session types

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub database: String,
    pub uploaded: bool,
    pub query_count: usize,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub max_rows: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub status: AskStatus,
    pub question: String,
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub total_rows: usize,
    pub shown_rows: usize,
    pub history_warning: Option<String>,
}

impl From<AskOutcome> for AskResponse {
    fn from(outcome: AskOutcome) -> Self {
        Self {
            status: outcome.status,
            question: outcome.question,
            sql: outcome.sql,
            shown_rows: outcome.result.row_count(),
            columns: outcome.result.columns,
            rows: outcome.result.rows,
            total_rows: outcome.total_rows,
            history_warning: outcome.history_warning,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
    pub warning: Option<String>,
}

// System status

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub session_count: usize,
    pub execution_mode: String,
    pub default_database: String,
}

async fn find_session(state: &AppState, id: &str) -> Result<SharedSession, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))
}

async fn session_info(session: &SharedSession) -> SessionInfo {
    let session = session.lock().await;
    SessionInfo {
        session_id: session.id.clone(),
        database: session.database.display().to_string(),
        uploaded: session.uploaded,
        query_count: session.log.len(),
        created_at: session.created_at.to_rfc3339(),
    }
}

// Sessions
pub async fn create_session(State(state): State<Arc<AppState>>) -> Json<SessionInfo> {
    let session = state.sessions.create().await;
    Json(session_info(&session).await)
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(session_info(&session).await))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .sessions
        .remove(&id)
        .await
        .ok_or_else(|| ApiError::session_not_found(&id))?;

    session.lock().await.release_upload().await;

    info!("Ended session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

// Database upload
pub async fn upload_database(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = find_session(&state, &id).await?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_upload", format!("Invalid multipart body: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload.sqlite").to_string();
        let data = field.bytes().await.map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, "invalid_upload", format!("Failed to read upload: {}", e))
        })?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let (file_name, data) = upload.ok_or_else(|| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_upload", "Missing 'file' field")
    })?;

    let extension = std::path::Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !DATABASE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unsupported_file",
            format!("Unsupported file type '{}' (expected .sqlite, .sqlite3 or .db)", file_name),
        ));
    }

    if !data.starts_with(SQLITE_MAGIC) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unsupported_file",
            format!("'{}' is not a SQLite database", file_name),
        ));
    }

    let target = state.upload_path(&id);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            error!("Failed to create upload directory: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "Failed to store upload")
        })?;
    }

    // Session stays locked while its database file is replaced
    let mut guard = session.lock().await;
    tokio::fs::write(&target, &data).await.map_err(|e| {
        error!("Failed to write uploaded database {}: {}", target.display(), e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "Failed to store upload")
    })?;
    guard.use_uploaded_database(&target);
    drop(guard);

    info!("Session {} uploaded {} ({} bytes)", id, file_name, data.len());
    Ok(Json(session_info(&session).await))
}

// Natural language question
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let session = find_session(&state, &id).await?;
    let max_rows = payload
        .max_rows
        .unwrap_or(state.config.session.default_max_rows)
        .clamp(MIN_DISPLAY_ROWS, MAX_DISPLAY_ROWS);
    debug!("Session {} question with max_rows {}", id, max_rows);

    // One question at a time per session
    let mut session = session.lock().await;
    let outcome = state.pipeline.ask(&mut session, &payload.question, max_rows).await?;

    Ok(Json(AskResponse::from(outcome)))
}

// Session log
pub async fn list_session_queries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    let session = find_session(&state, &id).await?;
    let session = session.lock().await;

    let records = session
        .log
        .list_reverse_chronological()
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(records))
}

// Export
pub async fn export_result(
    State(state): State<Arc<AppState>>,
    Path((id, format)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if format != "csv" {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unsupported_format",
            format!("Unsupported export format: {}", format),
        ));
    }

    let session = find_session(&state, &id).await?;
    let result = session.lock().await.last_result.clone().ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "no_result", "No result to export yet")
    })?;

    let bytes = export::to_csv(&result).map_err(|e| {
        error!("Failed to serialize CSV export: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "export_error", e.to_string())
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(export::CSV_CONTENT_TYPE));
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", export::CSV_FILE_NAME))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((StatusCode::OK, headers, bytes).into_response())
}

// All-time history; read failures degrade to an empty list plus a warning
pub async fn history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    let log = Arc::clone(state.pipeline.history());
    let loaded = tokio::task::spawn_blocking(move || log.load_all())
        .await
        .map_err(|e| e.to_string())
        .and_then(|result| result.map_err(|e| e.to_string()));

    match loaded {
        Ok(entries) => Json(HistoryResponse {
            entries,
            warning: None,
        }),
        Err(e) => {
            warn!("Failed to load history: {}", e);
            Json(HistoryResponse {
                entries: Vec::new(),
                warning: Some(e),
            })
        }
    }
}

// System status
pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        session_count: state.sessions.len().await,
        execution_mode: state.pipeline.executor().mode().to_string(),
        default_database: state.sessions.default_database().display().to_string(),
    })
}
