//! HTTP-facing error type.
//!
//! Every handler returns `Result<_, ApiError>`. Storage and token failures are
//! translated here, so no driver error ever reaches a response body.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::error;

use crate::auth::tokens::TokenError;
use crate::store::StoreError;
use crate::validator::ValidationErrors;

pub const INVALID_TOKEN: &str = "invalid or missing authentication token";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("failed validation")]
    ValidationFailed(ValidationErrors),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("the request could not be completed in time, please try again")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// A single-field validation failure.
    pub fn field(field: &str, message: &str) -> Self {
        let mut v = crate::validator::Validator::new();
        v.add_error(field, message);
        ApiError::ValidationFailed(v.errors().clone())
    }

    fn body(&self) -> Value {
        match self {
            ApiError::ValidationFailed(errors) => json!({ "error": errors }),
            ApiError::Internal(_) => json!({
                "error": "the server encountered a problem and could not process your request"
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref detail) = self {
            error!(error = %detail, "Request failed with an internal error.");
        }

        let mut response = (self.status(), Json(self.body())).into_response();
        if matches!(self, ApiError::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            StoreError::DuplicateEmail => {
                ApiError::field("email", "a user with this email address already exists")
            }
            StoreError::Timeout => ApiError::Timeout,
            StoreError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed(_) | TokenError::NotFound | TokenError::Expired => {
                ApiError::Unauthorized(INVALID_TOKEN.to_string())
            }
            TokenError::Generation(detail) => ApiError::Internal(detail),
            TokenError::Store(e) => e.into(),
        }
    }
}

/// `Json<T>` with rejections reported through `ApiError`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    let message = match rejection {
        JsonRejection::JsonDataError(e) => format!("body contains invalid data: {}", e.body_text()),
        JsonRejection::JsonSyntaxError(_) => "body contains badly-formed JSON".to_string(),
        JsonRejection::MissingJsonContentType(_) => {
            "body must be sent with Content-Type: application/json".to_string()
        }
        JsonRejection::BytesRejection(_) => "body must not be larger than 1MB".to_string(),
        other => other.body_text(),
    };
    ApiError::BadRequest(message)
}
