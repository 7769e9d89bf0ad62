use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid coordinate: lat {lat}, lng {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("no providers available")]
    NoProvidersAvailable,

    #[error("no eligible candidates")]
    NoEligibleCandidates,

    #[error("provider directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("voucher not applicable: {0}")]
    DiscountIneligible(String),

    #[error("offer no longer pending")]
    OfferExpired,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidCoordinate { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            AppError::NoProvidersAvailable | AppError::NoEligibleCandidates => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no providers nearby; try a wider radius or budget".to_string(),
            ),
            AppError::DirectoryUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                "provider directory temporarily unreachable".to_string(),
            ),
            AppError::DiscountIneligible(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::OfferExpired => (StatusCode::GONE, self.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
