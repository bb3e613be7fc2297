use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use trailfund_domain::model::SponsorshipId;
use trailfund_domain::services::sponsorships::cancel;

use crate::state::AppState;

use super::{caller_id, ApiError};

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub sponsorship_id: SponsorshipId,
    pub status: String,
}

/// Sponsor-initiated cancellation of an active subscription. The processor
/// subscription is canceled before the local row flips so a failure leaves
/// the sponsorship active.
pub async fn cancel_sponsorship_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let sponsorship = cancel(
        state.storage(),
        state.processor(),
        state.events(),
        caller,
        SponsorshipId(path.into_inner()),
    )
    .await?;

    Ok(HttpResponse::Ok().json(CancelResponse {
        sponsorship_id: sponsorship.id,
        status: sponsorship.status.as_ref().to_string(),
    }))
}
