use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use trailfund_domain::model::CheckoutId;
use trailfund_domain::services::refund::refund_charge;

use crate::state::AppState;

use super::{caller_id, ApiError};

#[derive(Debug, Serialize, Deserialize)]
pub struct RefundRequest {
    pub charge_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refund_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<CheckoutId>,
}

/// Creator-initiated refund of a received charge. The charge is traced back
/// through its transfer chain before any money moves.
pub async fn refund_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<RefundRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let payload = payload.into_inner();
    let outcome = refund_charge(
        state.storage(),
        state.processor(),
        state.events(),
        caller,
        &payload.charge_id,
        payload.reason,
    )
    .await?;

    Ok(HttpResponse::Ok().json(RefundResponse {
        refund_id: outcome.refund_id,
        checkout_id: outcome.checkout,
    }))
}
