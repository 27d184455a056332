//! Registration and account activation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::TokenError;
use crate::error::{ApiError, JsonBody};
use crate::mailer::{Mailer, Message};
use crate::models::permission::MOVIES_READ;
use crate::models::token::validate_token_plaintext;
use crate::models::user::validate_user;
use crate::models::{Password, Scope, User};
use crate::state::AppState;
use crate::store::{PermissionStore, StoreError, UserStore};
use crate::validator::Validator;

/// Registers user routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(register_user))
        .route("/v1/users/activated", put(activate_user))
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RegisterInput {
    name: String,
    email: String,
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ActivateInput {
    token: String,
}

#[derive(Serialize)]
struct UserEnvelope {
    user: User,
}

/// Hands `message` to the mailer on a background task.
pub(crate) fn send_in_background(state: &AppState, recipient: String, message: Message) {
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&recipient, &message).await {
            error!(error = %e, "Could not send mail.");
        }
    });
}

async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let mut user = User::new(input.name, input.email, Password::default());

    let mut v = Validator::new();
    validate_user(&mut v, &user, &input.password);
    v.finish().map_err(ApiError::ValidationFailed)?;

    user.password =
        Password::from_plaintext(&input.password).map_err(|e| ApiError::Internal(e.to_string()))?;

    let user = state.store.insert_user(state.deadline(), &user).await?;
    state
        .store
        .add_permissions_for_user(state.deadline(), user.id, &[MOVIES_READ])
        .await?;

    let token = state
        .tokens
        .issue(
            state.deadline(),
            user.id,
            state.config.tokens.activation_ttl(),
            Scope::Activation,
        )
        .await?;

    info!(user_id = user.id, "Registered user.");
    send_in_background(
        &state,
        user.email.clone(),
        Message::Welcome {
            user_id: user.id,
            activation_token: token.plaintext,
        },
    );

    Ok((StatusCode::ACCEPTED, Json(UserEnvelope { user })))
}

fn invalid_activation_token() -> ApiError {
    ApiError::field("token", "invalid or expired activation token")
}

async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateInput>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.finish().map_err(ApiError::ValidationFailed)?;

    let user_id = match state
        .tokens
        .authenticate(state.deadline(), &input.token, Scope::Activation)
        .await
    {
        Ok(user_id) => user_id,
        Err(TokenError::NotFound | TokenError::Expired | TokenError::Malformed(_)) => {
            return Err(invalid_activation_token())
        }
        Err(e) => return Err(e.into()),
    };

    let mut user = match state.store.get_user(state.deadline(), user_id).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(invalid_activation_token()),
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    user.version = state.store.update_user(state.deadline(), &user).await?;

    state
        .tokens
        .revoke_all(state.deadline(), user.id, Scope::Activation)
        .await?;

    info!(user_id = user.id, "Activated user.");
    Ok(Json(UserEnvelope { user }))
}
