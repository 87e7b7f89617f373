use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::{
    api::dto::*,
    auth::{CallerIdentity, IdentityResolver, TrustedHeaderIdentity},
    config::Config,
    models::internal::NewUser,
    orchestrator::{ChatOrchestrator, OrchestratorError},
    services::{
        registry::AvailableModel,
        text_extraction::{PlainTextExtractor, TextExtractor},
    },
    storage::repository::{ChatRepository, RepositoryError},
};

const DEV_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];
const DEMO_PROVIDER: &str = "demo";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub repo: Arc<dyn ChatRepository>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub extractor: Arc<dyn TextExtractor>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Wires the default collaborators around a repository.
    pub fn new(config: Arc<RwLock<Config>>, repo: Arc<dyn ChatRepository>) -> Self {
        Self {
            orchestrator: Arc::new(ChatOrchestrator::new(repo.clone(), config.clone())),
            extractor: Arc::new(PlainTextExtractor),
            identity: Arc::new(TrustedHeaderIdentity::new(repo.clone())),
            config,
            repo,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: status.as_u16() as u32,
        }),
    )
}

fn repository_error(e: RepositoryError) -> ApiError {
    match e {
        RepositoryError::NotFound(what) => error_response(StatusCode::NOT_FOUND, what),
        RepositoryError::InvalidInput(reason) => error_response(StatusCode::BAD_REQUEST, reason),
        RepositoryError::DbError(e) => {
            tracing::error!("Database error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn session_not_found() -> ApiError {
    error_response(StatusCode::NOT_FOUND, "Session not found")
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service status", body = StatusResponse))
)]
pub async fn root(State(state): State<AppState>) -> Json<StatusResponse> {
    let config = state.config.read().await;
    Json(StatusResponse {
        name: config.app_name.clone(),
        description: config.app_description.clone(),
        status: "running".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Liveness probe", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/demo-login",
    request_body = DemoLoginRequest,
    responses(
        (status = 200, description = "Demo user", body = UserResponse),
        (status = 403, description = "Demo mode disabled", body = ErrorResponse)
    )
)]
pub async fn demo_login(
    State(state): State<AppState>,
    Json(req): Json<DemoLoginRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if !state.config.read().await.demo_mode {
        return Err(error_response(StatusCode::FORBIDDEN, "Demo mode is disabled"));
    }

    let email = req.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Email is required"));
    }
    let display_name = match req.display_name.trim() {
        "" => email.clone(),
        name => name.to_string(),
    };

    let user = state
        .repo
        .get_or_create_user(NewUser {
            email,
            display_name,
            provider: DEMO_PROVIDER.to_string(),
        })
        .await
        .map_err(repository_error)?;

    tracing::info!(user_id = %user.id, "Demo login");
    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unknown caller", body = ErrorResponse)
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .repo
        .find_user(user_id)
        .await
        .map_err(repository_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "User not found"))?;

    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/api/auth/me",
    responses((status = 204, description = "User and everything it owns removed"))
)]
pub async fn delete_me(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
) -> Result<StatusCode, ApiError> {
    if !state
        .repo
        .delete_user(user_id)
        .await
        .map_err(repository_error)?
    {
        return Err(error_response(StatusCode::NOT_FOUND, "User not found"));
    }
    state.orchestrator.extraction_queue().forget(user_id);

    tracing::info!(%user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/chat/models",
    responses((status = 200, description = "Registered models", body = [AvailableModel]))
)]
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<AvailableModel>> {
    Json(state.orchestrator.router().available_models().await)
}

#[utoipa::path(
    post,
    path = "/api/chat/sessions",
    request_body = CreateSessionRequest,
    responses((status = 201, description = "Session created", body = SessionResponse))
)]
pub async fn create_session(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = state
        .repo
        .create_session(user_id, req.title)
        .await
        .map_err(repository_error)?;

    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

#[utoipa::path(
    get,
    path = "/api/chat/sessions",
    responses((status = 200, description = "Sessions, most recently updated first", body = [SessionResponse]))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state
        .repo
        .list_sessions(user_id)
        .await
        .map_err(repository_error)?;

    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/api/chat/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn delete_session(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .repo
        .delete_session(id, user_id)
        .await
        .map_err(repository_error)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found())
    }
}

#[utoipa::path(
    get,
    path = "/api/chat/sessions/{id}/messages",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageResponse]),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    if state
        .repo
        .find_session(id, user_id)
        .await
        .map_err(repository_error)?
        .is_none()
    {
        return Err(session_not_found());
    }

    let messages = state
        .repo
        .list_messages(id)
        .await
        .map_err(repository_error)?;

    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/chat/sessions/{id}/messages",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Persisted turn", body = SendMessageResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Message content is required"));
    }

    let image = req.image_base64.as_deref().filter(|img| !img.is_empty());
    let model = req.model.as_deref().filter(|m| !m.is_empty());

    let turn = state
        .orchestrator
        .handle_turn(id, user_id, &req.content, model, image)
        .await
        .map_err(|e| match e {
            OrchestratorError::SessionNotFound(_) => session_not_found(),
            OrchestratorError::Repository(e) => repository_error(e),
        })?;

    Ok(Json(SendMessageResponse {
        user_message: turn.user_message.into(),
        assistant_message: turn.assistant_message.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/chat/upload-document",
    request_body = UploadDocumentRequest,
    responses(
        (status = 200, description = "Extracted text", body = UploadDocumentResponse),
        (status = 400, description = "Unreadable document", body = ErrorResponse)
    )
)]
pub async fn upload_document(
    State(state): State<AppState>,
    CallerIdentity(_): CallerIdentity,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<Json<UploadDocumentResponse>, ApiError> {
    let bytes = STANDARD
        .decode(req.content_base64.trim())
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid base64: {}", e)))?;

    let content = state
        .extractor
        .extract(&bytes, &req.filename)
        .map_err(|e| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("Failed to extract text: {}", e),
            )
        })?;

    Ok(Json(UploadDocumentResponse {
        filename: req.filename,
        content,
    }))
}

#[utoipa::path(
    get,
    path = "/api/memory",
    responses((status = 200, description = "All facts, newest first", body = [MemoryResponse]))
)]
pub async fn list_memories(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
) -> Result<Json<Vec<MemoryResponse>>, ApiError> {
    let facts = state
        .orchestrator
        .memory()
        .list_all(user_id)
        .await
        .map_err(repository_error)?;

    Ok(Json(facts.into_iter().map(MemoryResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/memory",
    request_body = CreateMemoryRequest,
    responses(
        (status = 201, description = "Fact saved", body = MemoryResponse),
        (status = 400, description = "Empty key", body = ErrorResponse)
    )
)]
pub async fn create_memory(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Json(req): Json<CreateMemoryRequest>,
) -> Result<(StatusCode, Json<MemoryResponse>), ApiError> {
    let fact = state
        .orchestrator
        .memory()
        .save_memory(user_id, &req.key, &req.value, &req.category)
        .await
        .map_err(repository_error)?;

    Ok((StatusCode::CREATED, Json(MemoryResponse::from(fact))))
}

#[utoipa::path(
    delete,
    path = "/api/memory",
    responses((status = 200, description = "Number of facts removed", body = DeleteMemoriesResponse))
)]
pub async fn delete_memories(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
) -> Result<Json<DeleteMemoriesResponse>, ApiError> {
    let deleted = state
        .orchestrator
        .memory()
        .delete_all(user_id)
        .await
        .map_err(repository_error)?;

    Ok(Json(DeleteMemoriesResponse { deleted }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        root,
        health,
        demo_login,
        get_me,
        delete_me,
        list_models,
        create_session,
        list_sessions,
        delete_session,
        list_messages,
        send_message,
        upload_document,
        list_memories,
        create_memory,
        delete_memories
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in std::iter::once(frontend_url).chain(DEV_ORIGINS) {
        match origin.trim_end_matches('/').parse::<HeaderValue>() {
            Ok(value) if !origins.contains(&value) => origins.push(value),
            Ok(_) => {}
            Err(_) => tracing::warn!("Ignoring invalid CORS origin '{}'", origin),
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn create_router(state: AppState) -> Router {
    let frontend_url = state.config.read().await.frontend_url.clone();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/api/auth/demo-login", post(demo_login))
        .route("/api/auth/me", get(get_me).delete(delete_me))
        .route("/api/chat/models", get(list_models))
        .route(
            "/api/chat/sessions",
            post(create_session).get(list_sessions),
        )
        .route("/api/chat/sessions/{id}", delete(delete_session))
        .route(
            "/api/chat/sessions/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/api/chat/upload-document", post(upload_document))
        .route(
            "/api/memory",
            get(list_memories)
                .post(create_memory)
                .delete(delete_memories),
        )
        .layer(cors_layer(&frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
