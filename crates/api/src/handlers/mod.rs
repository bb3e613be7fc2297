pub mod checkout;
pub mod metrics;
pub mod refunds;
pub mod sponsorships;
pub mod tiers;
pub mod webhook;

pub use checkout::{begin_checkout_handler, confirm_checkout_handler};
pub use metrics::metrics_handler;
pub use refunds::refund_handler;
pub use sponsorships::cancel_sponsorship_handler;
pub use tiers::{list_tiers_handler, upsert_tier_handler};
pub use webhook::webhook_handler;

use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use trailfund_domain::error::ServiceError;
use trailfund_domain::model::ExplorerId;
use trailfund_processor::WebhookError;

/// Header carrying the authenticated explorer id, set by the session layer
/// in front of this service.
pub const CALLER_HEADER: &str = "X-Explorer-Id";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("webhook rejected: {0}")]
    Webhook(#[from] WebhookError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => match err {
                ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
                ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
                ServiceError::Forbidden | ServiceError::SelfSponsorship => StatusCode::FORBIDDEN,
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::Processor(_)
                | ServiceError::Storage(_)
                | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Webhook(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Service(err) if !err.is_client_visible() => {
                error!(error = %err, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { error: message })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Extracts the caller's explorer id from the request headers.
pub fn caller_id(req: &HttpRequest) -> Result<ExplorerId, ApiError> {
    let raw = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ServiceError::Unauthenticated)?;
    let id = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ServiceError::Unauthenticated)?;
    Ok(ExplorerId(id))
}
