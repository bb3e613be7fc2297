use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use trailfund_domain::model::{CheckoutId, SponsorshipId};
use trailfund_domain::services::checkout::{begin_checkout, BeginCheckoutRequest};
use trailfund_domain::services::completion::{confirm_payment_intent, CompletionOutcome};

use crate::state::AppState;

use super::{caller_id, ApiError};

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_id: CheckoutId,
    pub client_secret: String,
    pub payment_method_id: String,
}

pub async fn begin_checkout_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<BeginCheckoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let sponsor = caller_id(&req)?;
    let session = begin_checkout(
        state.storage(),
        state.processor(),
        state.fees(),
        state.currency(),
        sponsor,
        payload.into_inner(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(CheckoutResponse {
        checkout_id: session.checkout,
        client_secret: session.client_secret,
        payment_method_id: session.payment_method_id,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsorship_id: Option<SponsorshipId>,
}

/// Client-driven completion poll after the browser confirms the intent. Races
/// against the webhook; losing the race is still a success for the caller.
pub async fn confirm_checkout_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<ConfirmRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let outcome = confirm_payment_intent(
        state.storage(),
        state.processor(),
        state.fees(),
        state.events(),
        caller,
        &payload.payment_intent_id,
    )
    .await?;

    let response = match outcome {
        CompletionOutcome::Finalized(sponsorship) => ConfirmResponse {
            status: "finalized".to_string(),
            sponsorship_id: Some(sponsorship.id),
        },
        CompletionOutcome::AlreadyFinalized => ConfirmResponse {
            status: "already_finalized".to_string(),
            sponsorship_id: None,
        },
        CompletionOutcome::NotReady => ConfirmResponse {
            status: "not_ready".to_string(),
            sponsorship_id: None,
        },
    };
    Ok(HttpResponse::Ok().json(response))
}
