use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Failures of the booking core. Every variant is recoverable at the request boundary.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidDateRange(&'static str),
    #[error("dates not available")]
    DatesUnavailable,
    #[error("unauthorized")]
    Unauthorized,
    #[error("amount mismatch")]
    AmountMismatch,
    #[error("payment gateway not configured")]
    GatewayNotConfigured,
    #[error("{0}")]
    ValidationFailure(String),
    #[error("{0}")]
    InvalidTransition(&'static str),
    #[error("payment verification failed")]
    PaymentVerificationFailed,
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

/// Bodies that are not JSON or do not fit the request shape are validation failures.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        let status = match &err {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::InvalidDateRange(_)
            | BookingError::AmountMismatch
            | BookingError::GatewayNotConfigured
            | BookingError::ValidationFailure(_)
            | BookingError::PaymentVerificationFailed => StatusCode::BAD_REQUEST,
            BookingError::DatesUnavailable | BookingError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            BookingError::Unauthorized => StatusCode::FORBIDDEN,
            BookingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            BookingError::Store(e) => {
                tracing::error!(error = %e, "store operation failed");
                return Self::internal("database error");
            }
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = axum::Json(ErrorBody {
            detail: self.detail.as_str(),
        });
        (self.status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (BookingError::NotFound("booking"), StatusCode::NOT_FOUND),
            (
                BookingError::InvalidDateRange("check-out must be after check-in"),
                StatusCode::BAD_REQUEST,
            ),
            (BookingError::DatesUnavailable, StatusCode::CONFLICT),
            (BookingError::Unauthorized, StatusCode::FORBIDDEN),
            (BookingError::AmountMismatch, StatusCode::BAD_REQUEST),
            (BookingError::GatewayNotConfigured, StatusCode::BAD_REQUEST),
            (
                BookingError::InvalidTransition("booking already refunded"),
                StatusCode::CONFLICT,
            ),
            (BookingError::Gateway("boom".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn store_errors_do_not_leak_details() {
        let err = BookingError::Store(StoreError::Corrupt("payment_status=??".into()));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.detail, "database error");
    }

    #[test]
    fn not_found_detail_names_the_entity() {
        assert_eq!(
            ApiError::from(BookingError::NotFound("listing")).detail,
            "listing not found"
        );
    }
}
