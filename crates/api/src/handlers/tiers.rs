use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use trailfund_domain::model::{TierBilling, TierId, TierPatch, TierRecord};
use trailfund_domain::services::tiers::{list_tiers, upsert_tier};

use crate::state::AppState;

use super::{caller_id, ApiError};

#[derive(Debug, Serialize, Deserialize)]
pub struct TierResponse {
    pub id: TierId,
    pub label: String,
    pub priority: i16,
    pub billing: TierBilling,
    pub price_minor: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_available: bool,
    /// Whether the tier has live processor prices backing subscriptions.
    pub synced: bool,
}

impl From<TierRecord> for TierResponse {
    fn from(tier: TierRecord) -> Self {
        TierResponse {
            id: tier.id,
            label: tier.slot.label().to_string(),
            priority: tier.slot.priority(),
            billing: tier.billing,
            price_minor: tier.price_minor,
            currency: tier.currency,
            description: tier.description,
            is_available: tier.is_available,
            synced: tier.monthly_price_id.is_some(),
        }
    }
}

pub async fn list_tiers_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let creator = caller_id(&req)?;
    let tiers = list_tiers(state.storage(), creator).await?;
    let body: Vec<TierResponse> = tiers.into_iter().map(TierResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

pub async fn upsert_tier_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    payload: web::Json<TierPatch>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let tier = upsert_tier(
        state.storage(),
        state.processor(),
        state.currency(),
        caller,
        TierId(path.into_inner()),
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(TierResponse::from(tier)))
}
