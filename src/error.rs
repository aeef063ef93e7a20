use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("credentials missing for {service}: {hint}")]
    CredentialsMissing { service: &'static str, hint: String },

    #[error("{service} call failed: {message}")]
    ServiceCallFailed { service: &'static str, message: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("session {0} not found")]
    SessionNotFound(u64),

    #[error("console {0} not found")]
    ConsoleNotFound(Uuid),

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
}

impl AssistantError {
    pub fn credentials(service: &'static str, hint: impl Into<String>) -> Self {
        Self::CredentialsMissing { service, hint: hint.into() }
    }

    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        Self::ServiceCallFailed { service, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialsMissing { .. } => "credentials_missing",
            Self::ServiceCallFailed { .. } => "service_call_failed",
            Self::Validation(_) => "validation_error",
            Self::SessionNotFound(_) | Self::ConsoleNotFound(_) => "not_found",
            Self::UnsupportedModel(_) => "unsupported_model",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::CredentialsMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ServiceCallFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SessionNotFound(_) | Self::ConsoleNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedModel(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AssistantError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "error": { "kind": self.kind(), "message": self.to_string() } });
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (
                AssistantError::credentials("bedrock", "set a key"),
                "credentials_missing",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AssistantError::service("eks", "boom"),
                "service_call_failed",
                StatusCode::BAD_GATEWAY,
            ),
            (
                AssistantError::validation("empty"),
                "validation_error",
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AssistantError::SessionNotFound(3), "not_found", StatusCode::NOT_FOUND),
            (
                AssistantError::UnsupportedModel("x".into()),
                "unsupported_model",
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, kind, status) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn messages_name_the_failing_service() {
        let err = AssistantError::service("bedrock-runtime", "403 Forbidden");
        assert_eq!(err.to_string(), "bedrock-runtime call failed: 403 Forbidden");
    }
}
