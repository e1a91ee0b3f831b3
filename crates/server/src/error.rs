//! API error type and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cistern_clients::ClientError;
use cistern_ledger::LedgerError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("tariff unavailable: {0}")]
    TariffUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::TariffUnavailable(_) => "tariff_unavailable",
            Self::Internal(_) => "internal",
            Self::Ledger(err) => match err {
                LedgerError::NotFound(_) => "not_found",
                LedgerError::AlreadyExists(_) => "already_exists",
                LedgerError::NoCapacity { .. } => "no_capacity",
                LedgerError::InvalidResize { .. } => "invalid_resize",
                _ => "internal",
            },
            Self::Client(err) => match err {
                ClientError::TariffNotFound(_) => "tariff_not_found",
                _ => "upstream_error",
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::QuotaExceeded(_) | Self::TariffUnavailable(_) => {
                StatusCode::FORBIDDEN
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ledger(err) => match err {
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::AlreadyExists(_) => StatusCode::CONFLICT,
                LedgerError::NoCapacity { .. } => StatusCode::INSUFFICIENT_STORAGE,
                LedgerError::InvalidResize { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Client(err) => match err {
                ClientError::TariffNotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "code": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (
                ApiError::from(LedgerError::NotFound("volume x".into())),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                ApiError::from(LedgerError::AlreadyExists("volume x".into())),
                StatusCode::CONFLICT,
                "already_exists",
            ),
            (
                ApiError::from(LedgerError::NoCapacity { requested: 5 }),
                StatusCode::INSUFFICIENT_STORAGE,
                "no_capacity",
            ),
            (
                ApiError::from(LedgerError::InvalidResize {
                    current: 5,
                    requested: 3,
                }),
                StatusCode::BAD_REQUEST,
                "invalid_resize",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn client_errors_map_to_statuses() {
        let missing = ApiError::from(ClientError::TariffNotFound(Uuid::new_v4()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "tariff_not_found");

        let upstream = ApiError::from(ClientError::Service {
            service: "billing",
            status: 500,
            message: "boom".into(),
        });
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream.code(), "upstream_error");
    }

    #[test]
    fn policy_errors_are_forbidden() {
        let quota = ApiError::QuotaExceeded("no volume quota".into());
        assert_eq!(quota.status_code(), StatusCode::FORBIDDEN);

        let tariff = ApiError::TariffUnavailable("inactive".into());
        assert_eq!(tariff.status_code(), StatusCode::FORBIDDEN);
    }
}
