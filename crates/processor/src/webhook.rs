//! Webhook signature verification and event parsing.
//!
//! The processor signs each delivery with a timestamped HMAC over
//! `"{timestamp}.{payload}"` and sends it as `Signature: t=<unix>,v1=<hex>`.
//! Deliveries older than the tolerance window are rejected to limit replay.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use trailfund_domain::processor::PaymentIntent;

use crate::types::IntentDto;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const EVENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance window")]
    TimestampOutOfTolerance,
    #[error("signature verification failed")]
    SignatureMismatch,
    #[error("unparseable event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Events the ledger acts on. Everything else is surfaced as `Other` so the
/// endpoint can acknowledge it without processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorEvent {
    PaymentIntentSucceeded(PaymentIntent),
    Other(String),
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    #[cfg(test)]
    fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies the signature header against the raw request body and parses
    /// the event. The raw body must be the exact bytes received; any
    /// re-serialization would change the signed payload.
    pub fn parse_event(&self, payload: &str, header: &str) -> Result<ProcessorEvent, WebhookError> {
        self.verify_at(payload, header, Utc::now())?;

        let envelope: EventEnvelope = serde_json::from_str(payload)?;
        if envelope.event_type == EVENT_INTENT_SUCCEEDED {
            let intent: IntentDto = serde_json::from_value(envelope.data.object)?;
            return Ok(ProcessorEvent::PaymentIntentSucceeded(intent.into()));
        }
        debug!(event_type = %envelope.event_type, "ignoring webhook event");
        Ok(ProcessorEvent::Other(envelope.event_type))
    }

    fn verify_at(
        &self,
        payload: &str,
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let (timestamp, signature) = parse_header(header)?;

        if (now.timestamp() - timestamp).abs() > self.tolerance_secs {
            return Err(WebhookError::TimestampOutOfTolerance);
        }

        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(signed_payload.as_bytes());

        let expected = hex::decode(signature).map_err(|_| WebhookError::MalformedHeader)?;
        mac.verify_slice(&expected)
            .map_err(|_| WebhookError::SignatureMismatch)
    }
}

fn parse_header(header: &str) -> Result<(i64, &str), WebhookError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(timestamp), Some(signature)) => Ok((timestamp, signature)),
        _ => Err(WebhookError::MalformedHeader),
    }
}
