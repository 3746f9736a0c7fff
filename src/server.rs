//! JSON HTTP API.
//!
//! The caller's identity comes from the `x-user-id` header (a UUID), set by
//! an authenticating proxy in front of this server. Role checks happen here.
//!
//! # Endpoints
//!
//! | Method | Path | Role | Description |
//! |--------|------|------|-------------|
//! | `GET`    | `/health` | none | Health check (returns version) |
//! | `POST`   | `/upload?brain_id=&enable_summarization=` | Editor, Owner | Multipart file upload |
//! | `GET`    | `/explore?brain_id=` | member | Distinct files, largest first |
//! | `DELETE` | `/explore/{file_name}?brain_id=` | Owner | Remove a file from a brain |
//! | `GET`    | `/explore/{file_name}` | member of the file's first brain | Stored segments |
//! | `GET`    | `/brains` | caller | Caller's brains with rights |
//! | `POST`   | `/brains` | caller | Create a brain owned by the caller |
//! | `GET`    | `/brains/default` | caller | Default brain, created on first use |
//! | `GET`    | `/brains/{brain_id}` | member | Brain details |
//! | `PUT`    | `/brains/{brain_id}` | Editor, Owner | Update fields |
//! | `DELETE` | `/brains/{brain_id}` | Owner | Delete with cascade |
//! | `POST`   | `/brains/{brain_id}/default` | member | Make it the caller's default |
//! | `GET`    | `/brains/{brain_id}/users` | Owner | Memberships |
//! | `POST`   | `/brains/{brain_id}/users` | Owner | Add a member |
//! | `DELETE` | `/brains/{brain_id}/users/{user_id}` | Owner | Remove a member |
//!
//! An upload that is rejected for a business reason (quota, duplicate,
//! unsupported type) still answers `200` with `{"message", "type": "error"}`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `unavailable` (503), `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use brainstore_core::models::{
    Brain, BrainUpdate, BrainUser, FileSummary, NewBrain, Role, UploadMessage, UserBrain,
    VectorRecord,
};
use brainstore_core::Error;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::authorization::{require_role, ANY_MEMBER, EDITORS, OWNERS};
use crate::brains;
use crate::context::AppContext;
use crate::explore;
use crate::reaper::ReapReport;
use crate::upload::{upload_for_user, UploadOptions, UploadedFile};

pub const USER_HEADER: &str = "x-user-id";
pub const API_KEY_HEADER: &str = "openai-api-key";

/// Build the router over `ctx`.
pub fn router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = ctx.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/explore", get(handle_explore))
        .route(
            "/explore/{file_name}",
            get(handle_download).delete(handle_delete_file),
        )
        .route("/brains", get(handle_list_brains).post(handle_create_brain))
        .route("/brains/default", get(handle_default_brain))
        .route(
            "/brains/{brain_id}",
            get(handle_get_brain)
                .put(handle_update_brain)
                .delete(handle_delete_brain),
        )
        .route("/brains/{brain_id}/default", post(handle_set_default))
        .route(
            "/brains/{brain_id}/users",
            get(handle_list_users).post(handle_add_user),
        )
        .route(
            "/brains/{brain_id}/users/{user_id}",
            delete(handle_remove_user),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(ctx)
}

/// Serve on `[server].bind` until the process is stopped.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "server listening");
    println!("brainstore listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    app_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let transient = err.is_transient();
        let message = err.to_string();
        match err {
            Error::NotFound(_) | Error::BrainNotFound(_) => {
                app_error(StatusCode::NOT_FOUND, "not_found", message)
            }
            Error::Forbidden(_) => app_error(StatusCode::FORBIDDEN, "forbidden", message),
            Error::InvalidInput(_) | Error::Extraction(_) => bad_request(message),
            _ if transient => {
                tracing::warn!(error = %message, "upstream unavailable");
                app_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
            }
            _ => {
                tracing::error!(error = %message, "request failed");
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ Caller identity ============

/// The authenticated caller, read from [`USER_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| unauthorized(format!("missing {} header", USER_HEADER)))?;
        let value = raw
            .to_str()
            .map_err(|_| unauthorized(format!("{} header is not valid text", USER_HEADER)))?;
        Uuid::parse_str(value.trim())
            .map(CurrentUser)
            .map_err(|_| unauthorized(format!("{} header is not a UUID", USER_HEADER)))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

#[derive(Deserialize)]
struct UploadQuery {
    brain_id: Uuid,
    #[serde(default)]
    enable_summarization: bool,
}

async fn handle_upload(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadMessage>, AppError> {
    let credential = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|e| bad_request(e.body_text()))?;
        file = Some(UploadedFile::new(name, bytes.to_vec()));
        break;
    }
    let file = file.ok_or_else(|| bad_request("multipart body has no file part"))?;

    let options = UploadOptions {
        enable_summarization: query.enable_summarization,
        credential,
    };
    let message = upload_for_user(&ctx, user_id, query.brain_id, &file, &options).await?;
    Ok(Json(message))
}

// ============ /explore ============

#[derive(Deserialize)]
struct BrainQuery {
    brain_id: Uuid,
}

#[derive(Serialize)]
struct FilesResponse {
    documents: Vec<FileSummary>,
}

async fn handle_explore(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<BrainQuery>,
) -> Result<Json<FilesResponse>, AppError> {
    let documents = explore::list_files(&ctx, user_id, query.brain_id).await?;
    Ok(Json(FilesResponse { documents }))
}

#[derive(Serialize)]
struct DeleteFileResponse {
    message: String,
    #[serde(flatten)]
    report: ReapReport,
}

async fn handle_delete_file(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(file_name): Path<String>,
    Query(query): Query<BrainQuery>,
) -> Result<Json<DeleteFileResponse>, AppError> {
    let report = explore::delete_file(&ctx, user_id, query.brain_id, &file_name).await?;
    Ok(Json(DeleteFileResponse {
        message: format!(
            "{} of brain {} has been deleted by user {}.",
            file_name, query.brain_id, user_id
        ),
        report,
    }))
}

#[derive(Serialize)]
struct DownloadResponse {
    documents: Vec<VectorRecord>,
}

async fn handle_download(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(file_name): Path<String>,
) -> Result<Json<DownloadResponse>, AppError> {
    let documents = explore::download_file(&ctx, user_id, &file_name).await?;
    Ok(Json(DownloadResponse { documents }))
}

// ============ /brains ============

#[derive(Serialize)]
struct BrainsResponse {
    brains: Vec<UserBrain>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_list_brains(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<BrainsResponse>, AppError> {
    let brains = brains::user_brains(&ctx, user_id).await?;
    Ok(Json(BrainsResponse { brains }))
}

async fn handle_create_brain(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Json(new): Json<NewBrain>,
) -> Result<(StatusCode, Json<Brain>), AppError> {
    let brain = brains::create_brain_for_user(&ctx, user_id, &new).await?;
    Ok((StatusCode::CREATED, Json(brain)))
}

async fn handle_default_brain(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Brain>, AppError> {
    Ok(Json(brains::default_brain_or_create(&ctx, user_id).await?))
}

async fn handle_get_brain(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(brain_id): Path<Uuid>,
) -> Result<Json<Brain>, AppError> {
    require_role(&ctx, brain_id, user_id, ANY_MEMBER).await?;
    Ok(Json(brains::get_brain(&ctx, brain_id).await?))
}

async fn handle_update_brain(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(brain_id): Path<Uuid>,
    Json(update): Json<BrainUpdate>,
) -> Result<Json<Brain>, AppError> {
    require_role(&ctx, brain_id, user_id, EDITORS).await?;
    if update.is_empty() {
        return Err(bad_request("update has no fields"));
    }
    Ok(Json(brains::update_brain(&ctx, brain_id, &update).await?))
}

async fn handle_delete_brain(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(brain_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    brains::delete_brain(&ctx, brain_id, user_id).await?;
    Ok(Json(MessageResponse {
        message: format!("Brain {} has been deleted.", brain_id),
    }))
}

async fn handle_set_default(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(brain_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    require_role(&ctx, brain_id, user_id, ANY_MEMBER).await?;
    brains::set_default_brain(&ctx, brain_id, user_id).await?;
    Ok(Json(MessageResponse {
        message: format!("Brain {} is now the default brain.", brain_id),
    }))
}

#[derive(Serialize)]
struct UsersResponse {
    users: Vec<BrainUser>,
}

#[derive(Deserialize)]
struct AddUserRequest {
    user_id: Uuid,
    rights: Role,
    #[serde(default)]
    default_brain: bool,
}

async fn handle_list_users(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(brain_id): Path<Uuid>,
) -> Result<Json<UsersResponse>, AppError> {
    require_role(&ctx, brain_id, user_id, OWNERS).await?;
    let users = brains::brain_users(&ctx, brain_id).await?;
    Ok(Json(UsersResponse { users }))
}

async fn handle_add_user(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path(brain_id): Path<Uuid>,
    Json(req): Json<AddUserRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    require_role(&ctx, brain_id, user_id, OWNERS).await?;
    brains::add_user(&ctx, brain_id, req.user_id, req.rights, req.default_brain).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!(
                "User {} added to brain {} as {}.",
                req.user_id, brain_id, req.rights
            ),
        }),
    ))
}

async fn handle_remove_user(
    State(ctx): State<AppContext>,
    CurrentUser(user_id): CurrentUser,
    Path((brain_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageResponse>, AppError> {
    require_role(&ctx, brain_id, user_id, OWNERS).await?;
    brains::remove_user(&ctx, brain_id, member_id).await?;
    Ok(Json(MessageResponse {
        message: format!("User {} removed from brain {}.", member_id, brain_id),
    }))
}
