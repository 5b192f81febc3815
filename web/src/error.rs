//! Error type for REST handlers.
//!
//! [`AppError`] turns ticket store failures into an HTTP status plus a JSON
//! [`ErrorBody`]. The `code` values are part of the API: HTTP clients map
//! them back onto [`StoreError`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rifas_core::store::StoreError;
use rifas_core::wire::{ErrorBody, error_codes as codes};
use std::fmt;

/// Application error returned by every handler
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Raffle>, AppError> {
///     Ok(Json(state.store.get_raffle(id).await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    details: Option<serde_json::Value>,
    /// Kept for logging, never sent to the client
    source: Option<StoreError>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            details: None,
            source: None,
        }
    }

    /// Attach structured details to the body
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status of the response
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Error code of the response
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, codes::BAD_REQUEST)
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, codes::NOT_FOUND)
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message, codes::CONFLICT)
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, codes::VALIDATION_ERROR)
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, codes::SERVICE_UNAVAILABLE)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        let mapped = match &error {
            StoreError::NotFound(message) => Self::not_found(message.clone()),
            StoreError::RaffleNotOpen { raffle, status } => {
                Self::new(StatusCode::CONFLICT, error.to_string(), codes::RAFFLE_NOT_OPEN)
                    .with_details(serde_json::json!({ "rifaId": raffle, "estado": status }))
            },
            StoreError::Validation(message) => Self::validation(message.clone()),
            StoreError::Decode(message) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.clone(), codes::DECODE_ERROR)
            },
            StoreError::Unavailable(message) => Self::unavailable(message.clone()),
            StoreError::Conflict(message) => Self::conflict(message.clone()),
        };
        Self {
            source: Some(error),
            ..mapped
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        metrics::counter!("rifas.http.errors", "code" => self.code).increment(1);

        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        } else {
            tracing::debug!(status = %self.status, code = self.code, message = %self.message, "Request rejected");
        }

        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rifas_core::types::{RaffleId, RaffleStatus};

    #[test]
    fn display_includes_code() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::NotFound("raffle 9".into()), StatusCode::NOT_FOUND, codes::NOT_FOUND),
            (StoreError::Validation("bad range".into()), StatusCode::UNPROCESSABLE_ENTITY, codes::VALIDATION_ERROR),
            (StoreError::Conflict("lock".into()), StatusCode::CONFLICT, codes::CONFLICT),
            (StoreError::Unavailable("db down".into()), StatusCode::SERVICE_UNAVAILABLE, codes::SERVICE_UNAVAILABLE),
            (StoreError::Decode("row".into()), StatusCode::INTERNAL_SERVER_ERROR, codes::DECODE_ERROR),
        ];

        for (error, status, code) in cases {
            let mapped = AppError::from(error);
            assert_eq!(mapped.status(), status);
            assert_eq!(mapped.code(), code);
        }
    }

    #[test]
    fn closed_raffle_carries_its_status() {
        let err = AppError::from(StoreError::RaffleNotOpen {
            raffle: RaffleId::new(4),
            status: RaffleStatus::Pausada,
        });

        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), codes::RAFFLE_NOT_OPEN);
        assert_eq!(err.details, Some(serde_json::json!({ "rifaId": 4, "estado": "PAUSADA" })));
    }
}
