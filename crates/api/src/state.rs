use std::sync::Arc;

use trailfund_domain::money::FeeSchedule;
use trailfund_domain::processor::PaymentProcessor;
use trailfund_domain::services::{events::EventSender, telemetry::TelemetryGuard};
use trailfund_processor::WebhookVerifier;
use trailfund_storage::SeaOrmStorage;

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    processor: Arc<dyn PaymentProcessor>,
    webhook: Arc<WebhookVerifier>,
    fees: FeeSchedule,
    currency: String,
    events: EventSender,
    telemetry: TelemetryGuard,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: SeaOrmStorage,
        processor: Arc<dyn PaymentProcessor>,
        webhook: Arc<WebhookVerifier>,
        fees: FeeSchedule,
        currency: String,
        events: EventSender,
        telemetry: TelemetryGuard,
    ) -> Self {
        Self {
            storage,
            processor,
            webhook,
            fees,
            currency,
            events,
            telemetry,
        }
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn processor(&self) -> &dyn PaymentProcessor {
        self.processor.as_ref()
    }

    pub fn webhook(&self) -> &WebhookVerifier {
        &self.webhook
    }

    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}
