#![allow(dead_code)]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error types that can be returned from handlers. The five
/// `*Forecast*`/`ConfigurationInvalid`/`PersistenceConflict`/
/// `UpstreamUnavailable` variants correspond to the engine-facing failure
/// classes of §7; `NotFound`/`BadRequest`/etc. are ordinary HTTP-layer
/// concerns with no engine counterpart.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Forecast input was structurally invalid (§4.2 malformed checks).
    #[error("Malformed forecast: {0}")]
    MalformedForecast(String),

    /// Forecast adapted but more than 25% of daytime buckets needed
    /// synthesis (§4.3 step 4 budget).
    #[error("Unusable forecast: {0}")]
    UnusableForecast(String),

    /// The forecast collaborator behind `ForecastSource::fetch` could not be
    /// reached or returned no usable data.
    #[error("Upstream forecast source unavailable: {0}")]
    UpstreamUnavailable(String),

    /// `SystemConfiguration::validate()` or the dispatch engine's own
    /// pre-flight check rejected the microgrid's configuration.
    #[error("Invalid system configuration: {0}")]
    ConfigurationInvalid(String),

    /// A concurrent write lost the race for a microgrid's lock, or the
    /// repository rejected a write outright (§5, §6).
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_)
            | ApiError::ValidationError(_)
            | ApiError::MalformedForecast(_)
            | ApiError::UnusableForecast(_)
            | ApiError::ConfigurationInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) | ApiError::PersistenceConflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) | ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error type string
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Forbidden => "Forbidden",
            ApiError::Conflict(_) => "Conflict",
            ApiError::InternalError(_) => "InternalServerError",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::DatabaseError(_) => "DatabaseError",
            ApiError::MalformedForecast(_) => "MalformedForecast",
            ApiError::UnusableForecast(_) => "UnusableForecast",
            ApiError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            ApiError::ConfigurationInvalid(_) => "ConfigurationInvalid",
            ApiError::PersistenceConflict(_) => "PersistenceConflict",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                tracing::error!(error = %self, "API error occurred");
                "An internal error occurred".to_string()
            }
            ApiError::ServiceUnavailable(_) | ApiError::UpstreamUnavailable(_) => {
                tracing::warn!(error = %self, "Service unavailable");
                "Service temporarily unavailable".to_string()
            }
            ApiError::PersistenceConflict(_) => {
                tracing::warn!(error = %self, "Persistence conflict");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "Client error");
                self.to_string()
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        };

        (status, Json(error_response)).into_response()
    }
}

// Conversion from common error types

#[cfg(feature = "db")]
impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                ApiError::DatabaseError(format!("Database error: {}", db_err))
            }
            _ => ApiError::DatabaseError(format!("Database error: {}", error)),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    /// Controller-layer errors are plain `anyhow::Error` chains (§11.1), but
    /// the original `thiserror` cause survives inside the chain via
    /// `anyhow::Context`, so the specific engine error classes can still be
    /// recovered here rather than collapsing everything to a 500.
    fn from(error: anyhow::Error) -> Self {
        if let Some(e) = error.downcast_ref::<crate::forecast_validator::ValidatorError>() {
            return ApiError::from(e.clone());
        }
        if let Some(e) = error.downcast_ref::<crate::forecast_adapter::AdapterError>() {
            return ApiError::from(e.clone());
        }
        if let Some(e) = error.downcast_ref::<crate::dispatch::EngineError>() {
            return ApiError::from(e.clone());
        }
        ApiError::InternalError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}

impl From<crate::forecast_validator::ValidatorError> for ApiError {
    fn from(error: crate::forecast_validator::ValidatorError) -> Self {
        match error {
            crate::forecast_validator::ValidatorError::MalformedForecast(msg) => ApiError::MalformedForecast(msg),
        }
    }
}

impl From<crate::forecast_adapter::AdapterError> for ApiError {
    fn from(error: crate::forecast_adapter::AdapterError) -> Self {
        match error {
            crate::forecast_adapter::AdapterError::InvalidHorizon(h) => {
                ApiError::BadRequest(format!("forecast horizon must be between 1 and 48 hours, got {h}"))
            }
            crate::forecast_adapter::AdapterError::UnusableForecast { synthesized, daytime_total } => {
                ApiError::UnusableForecast(format!("{synthesized}/{daytime_total} daytime buckets had to be synthesized"))
            }
        }
    }
}

impl From<crate::dispatch::EngineError> for ApiError {
    fn from(error: crate::dispatch::EngineError) -> Self {
        match error {
            crate::dispatch::EngineError::InvalidConfiguration(msg) => ApiError::ConfigurationInvalid(msg),
            other @ (crate::dispatch::EngineError::InitialSocOutOfRange(_)
            | crate::dispatch::EngineError::EmptyForecast { .. }) => ApiError::BadRequest(other.to_string()),
        }
    }
}
