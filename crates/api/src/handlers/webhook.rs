use actix_web::{web, HttpRequest, HttpResponse};
use metrics::counter;
use serde::Serialize;
use tracing::debug;

use trailfund_domain::services::completion::complete_from_intent;
use trailfund_processor::{ProcessorEvent, WebhookError};

use crate::state::AppState;

use super::ApiError;

/// Signature header attached by the processor to every delivery.
pub const SIGNATURE_HEADER: &str = "Processor-Signature";

#[derive(Debug, Serialize)]
struct WebhookAck {
    received: bool,
}

/// Processor webhook endpoint. The signature is verified over the raw body
/// bytes; a re-serialized body would not match. Unhandled event types are
/// acknowledged so the processor stops retrying them.
pub async fn webhook_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MalformedHeader)?;
    let payload = std::str::from_utf8(&body).map_err(|_| WebhookError::MalformedHeader)?;

    let event = state.webhook().parse_event(payload, signature).map_err(|err| {
        counter!("webhook_deliveries_total", "status" => "rejected").increment(1);
        err
    })?;

    match event {
        ProcessorEvent::PaymentIntentSucceeded(intent) => {
            complete_from_intent(state.storage(), state.fees(), state.events(), &intent).await?;
            counter!("webhook_deliveries_total", "status" => "processed").increment(1);
        }
        ProcessorEvent::Other(event_type) => {
            debug!(event_type, "acknowledging unhandled webhook event");
            counter!("webhook_deliveries_total", "status" => "ignored").increment(1);
        }
    }

    Ok(HttpResponse::Ok().json(WebhookAck { received: true }))
}
