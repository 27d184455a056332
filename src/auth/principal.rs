use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::{debug, warn};

use super::gate::{require, Decision};
use crate::error::{ApiError, INVALID_TOKEN};
use crate::models::{Scope, User};
use crate::state::AppState;
use crate::store::{PermissionStore, StoreError, UserStore};

pub const AUTHENTICATION_REQUIRED: &str = "you must be authenticated to access this resource";
pub const ACTIVATION_REQUIRED: &str = "your user account must be activated to access this resource";
pub const PERMISSION_REQUIRED: &str =
    "your user account doesn't have the necessary permissions to access this resource";

/// Who a request runs on behalf of.
#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    User(User),
}

impl Principal {
    /// The user, if the request carried a valid token.
    pub fn user(&self) -> Result<&User, ApiError> {
        match self {
            Principal::Anonymous => Err(ApiError::Unauthorized(
                AUTHENTICATION_REQUIRED.to_string(),
            )),
            Principal::User(user) => Ok(user),
        }
    }

    pub fn activated_user(&self) -> Result<&User, ApiError> {
        let user = self.user()?;
        if !user.activated {
            return Err(ApiError::Forbidden(ACTIVATION_REQUIRED.to_string()));
        }
        Ok(user)
    }

    /// Checks `code` against the user's permissions as stored right now.
    pub async fn require_permission(
        &self,
        state: &AppState,
        code: &str,
    ) -> Result<&User, ApiError> {
        let user = self.activated_user()?;
        let permissions = state
            .store
            .get_permissions_for_user(state.deadline(), user.id)
            .await?;

        match require(&permissions, code) {
            Decision::Allow => Ok(user),
            Decision::Deny => {
                debug!(user_id = user.id, permission = code, "Permission denied.");
                Err(ApiError::Forbidden(PERMISSION_REQUIRED.to_string()))
            }
        }
    }
}

fn invalid_token() -> ApiError {
    ApiError::Unauthorized(INVALID_TOKEN.to_string())
}

/// Extractor implementation: resolves the `Authorization: Bearer <token>` header.
/// No header at all is an anonymous request; anything else that fails is a 401.
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Principal::Anonymous);
        };

        let header = header.to_str().map_err(|_| invalid_token())?;
        let plaintext = match header.split(' ').collect::<Vec<_>>().as_slice() {
            ["Bearer", token] => *token,
            _ => {
                warn!("Authorization header invalid format.");
                return Err(invalid_token());
            }
        };

        let user_id = state
            .tokens
            .authenticate(state.deadline(), plaintext, Scope::Authorization)
            .await?;

        match state.store.get_user(state.deadline(), user_id).await {
            Ok(user) => Ok(Principal::User(user)),
            Err(StoreError::NotFound) => Err(invalid_token()),
            Err(e) => Err(e.into()),
        }
    }
}
