//! Token issuance endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::user_routes::send_in_background;
use crate::error::{ApiError, JsonBody};
use crate::mailer::Message;
use crate::models::user::{validate_email, validate_password_plaintext};
use crate::models::{Scope, Token};
use crate::state::AppState;
use crate::store::{StoreError, UserStore};
use crate::validator::Validator;

pub const INVALID_CREDENTIALS: &str = "invalid authentication credentials";

/// Registers token routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tokens/activation", post(create_activation_token))
        .route("/v1/tokens/authentication", post(create_authentication_token))
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ActivationTokenInput {
    email: String,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct CredentialsInput {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct AuthenticationTokenEnvelope {
    authentication_token: Token,
}

/// Re-sends an activation token to a registered, not yet activated user.
async fn create_activation_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivationTokenInput>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    v.finish().map_err(ApiError::ValidationFailed)?;

    let user = match state
        .store
        .get_user_by_email(state.deadline(), &input.email)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(ApiError::field("email", "no matching email address found"))
        }
        Err(e) => return Err(e.into()),
    };

    if user.activated {
        return Err(ApiError::field("email", "user has already been activated"));
    }

    let token = state
        .tokens
        .issue(
            state.deadline(),
            user.id,
            state.config.tokens.activation_ttl(),
            Scope::Activation,
        )
        .await?;

    send_in_background(
        &state,
        user.email,
        Message::Activation {
            activation_token: token.plaintext,
        },
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing activation instructions"
        })),
    ))
}

/// Exchanges email and password for a new authorization token. Earlier
/// authorization tokens of the user stop working.
async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CredentialsInput>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish().map_err(ApiError::ValidationFailed)?;

    let user = match state
        .store
        .get_user_by_email(state.deadline(), &input.email)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let matches = user
        .password
        .matches(&input.password)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !matches {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    state
        .tokens
        .revoke_all(state.deadline(), user.id, Scope::Authorization)
        .await?;
    let token = state
        .tokens
        .issue(
            state.deadline(),
            user.id,
            state.config.tokens.authorization_ttl(),
            Scope::Authorization,
        )
        .await?;

    info!(user_id = user.id, "Issued authentication token.");
    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenEnvelope {
            authentication_token: token,
        }),
    ))
}
