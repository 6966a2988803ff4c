//! Structured error types for API responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

use crate::ai::AiError;
use crate::docx::TemplateError;
use crate::report::ReportError;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (4xx-like)
    MissingRequiredField,
    InvalidFieldValue,
    InvalidTemplate,

    // Not found errors
    ParameterNotFound,

    // Conflict errors
    AlreadyExists,

    // Upstream errors
    AiServiceError,

    // Internal errors
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    /// HTTP status used when the error leaves the web API.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::InvalidTemplate => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ParameterNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::AiServiceError => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Structured error for API responses.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn parameter_not_found(id: &str) -> Self {
        Self::new(
            ErrorCode::ParameterNotFound,
            format!("Parameter not found: {}", id),
        )
    }

    pub fn duplicate_name(name: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("A parameter named '{}' already exists", name),
        )
        .with_field("name")
    }

    pub fn invalid_template(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InvalidTemplate, err.to_string())
    }

    pub fn ai_service(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::AiServiceError, err.to_string())
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => ApiError::internal(format!("{:#}", err)),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        ApiError::invalid_template(err)
    }
}

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::Api { status, body } => ApiError::ai_service(format!(
                "AI provider returned HTTP {}",
                status
            ))
            .with_details(body),
            other => ApiError::ai_service(other),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Template(e) => ApiError::invalid_template(e),
            ReportError::Database(e) => ApiError::database(format!("{:#}", e)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

/// Result type for API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_screaming_snake_case() {
        let err = ApiError::missing_field("name");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"MISSING_REQUIRED_FIELD\""));
        assert!(json.contains("\"field\":\"name\""));
        assert!(!json.contains("details"));
    }

    #[test]
    fn provider_error_body_goes_to_details() {
        let err = ApiError::from(AiError::Api {
            status: 429,
            body: "quota exceeded".into(),
        });
        assert_eq!(err.code, ErrorCode::AiServiceError);
        assert_eq!(err.message, "AI provider returned HTTP 429");
        assert_eq!(err.details.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::parameter_not_found("x").code.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::duplicate_name("x").code.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::ai_service("down").code.status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn anyhow_roundtrip_keeps_structured_error() {
        let err: anyhow::Error = ApiError::duplicate_name("total_sales").into();
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::AlreadyExists);
    }
}
