use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::ErrorResponse;
use crate::api::routes::AppState;
use crate::storage::repository::{ChatRepository, RepositoryError};

/// Header carrying the caller's user id, set by the authenticating proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Missing X-User-Id header")]
    Missing,
    #[error("Malformed user id")]
    Malformed,
    #[error("Unknown user")]
    UnknownUser,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Turns request headers into the id of an existing user.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Uuid, IdentityError>;
}

/// Trusts the user id header as-is and only checks the user exists.
pub struct TrustedHeaderIdentity {
    repo: Arc<dyn ChatRepository>,
}

impl TrustedHeaderIdentity {
    pub fn new(repo: Arc<dyn ChatRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl IdentityResolver for TrustedHeaderIdentity {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Uuid, IdentityError> {
        let raw = headers
            .get(USER_ID_HEADER)
            .ok_or(IdentityError::Missing)?
            .to_str()
            .map_err(|_| IdentityError::Malformed)?;

        let user_id = Uuid::parse_str(raw.trim()).map_err(|_| IdentityError::Malformed)?;

        match self.repo.find_user(user_id).await? {
            Some(user) => Ok(user.id),
            None => Err(IdentityError::UnknownUser),
        }
    }
}

/// Authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity(pub Uuid);

impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.identity.resolve(&parts.headers).await {
            Ok(user_id) => Ok(CallerIdentity(user_id)),
            Err(IdentityError::Repository(e)) => {
                tracing::error!("Identity lookup failed: {}", e);
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: e.to_string(),
                        code: 500,
                    }),
                )
                    .into_response())
            }
            Err(e) => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: 401,
                }),
            )
                .into_response()),
        }
    }
}
