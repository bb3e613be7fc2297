//! Capability contract for the external payment processor.
//!
//! The processor owns customers, prices, payment intents, subscriptions,
//! transfers, and refunds; this core only orchestrates around them. The trait
//! keeps the HTTP client swappable for scripted mocks in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{CheckoutId, ExplorerId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// The referenced object does not exist on the processor. Distinguished
    /// from other API errors because tier sync self-heals on a missing
    /// product (cross-environment product-id mismatch).
    #[error("processor has no {resource} `{id}`")]
    Missing { resource: &'static str, id: String },
    #[error("processor rejected the request: {message}")]
    Api {
        code: Option<String>,
        message: String,
    },
    #[error("processor transport failure: {0}")]
    Transport(String),
}

impl ProcessorError {
    pub fn missing(resource: &'static str, id: impl Into<String>) -> Self {
        Self::Missing {
            resource,
            id: id.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ProcessorError::Missing { .. })
    }
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Connected-account readiness snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub pending_requirements: Vec<String>,
}

impl AccountSnapshot {
    /// A creator can receive sponsorships only when the account is verified,
    /// charge-enabled, payout-enabled, and has no pending requirements.
    pub fn ready_for_payments(&self) -> bool {
        self.charges_enabled
            && self.payouts_enabled
            && self.details_submitted
            && self.pending_requirements.is_empty()
    }
}

/// Traceability metadata attached to every payment intent. For one-time
/// payments it rides on the intent creation call itself so the intent never
/// exists without it; subscriptions attach it in a follow-up call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub checkout: CheckoutId,
    pub sponsor: ExplorerId,
    pub creator: ExplorerId,
}

pub const METADATA_CHECKOUT_ID: &str = "checkout_id";
pub const METADATA_SPONSOR_ID: &str = "sponsor_id";
pub const METADATA_CREATOR_ID: &str = "creator_id";

impl PaymentMetadata {
    pub fn to_pairs(self) -> Vec<(String, String)> {
        vec![
            (METADATA_CHECKOUT_ID.to_string(), self.checkout.to_string()),
            (METADATA_SPONSOR_ID.to_string(), self.sponsor.to_string()),
            (METADATA_CREATOR_ID.to_string(), self.creator.to_string()),
        ]
    }

    /// Parses the metadata map carried by a retrieved intent. `None` when any
    /// of the three ids is absent or malformed.
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        let parse = |key: &str| map.get(key)?.parse::<i64>().ok();
        Some(Self {
            checkout: CheckoutId(parse(METADATA_CHECKOUT_ID)?),
            sponsor: ExplorerId(parse(METADATA_SPONSOR_ID)?),
            creator: ExplorerId(parse(METADATA_CREATOR_ID)?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentIntent {
    pub amount_minor: i64,
    pub currency: String,
    pub customer_id: String,
    pub payment_method_id: String,
    /// Connected account receiving the transferred funds.
    pub destination_account: String,
    pub application_fee_minor: i64,
    pub metadata: PaymentMetadata,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceInterval {
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrice {
    pub product_id: String,
    pub amount_minor: i64,
    pub currency: String,
    /// `None` creates a one-time price.
    pub interval: Option<PriceInterval>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
    pub id: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubscription {
    pub customer_id: String,
    pub price_id: String,
    pub payment_method_id: String,
    pub destination_account: String,
    pub application_fee_percent: f64,
    pub idempotency_key: String,
}

/// Subscription handle; the first invoice's payment intent carries the client
/// secret the browser confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
    pub latest_invoice_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeSnapshot {
    pub id: String,
    pub refunded: bool,
    pub source_transfer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub id: String,
    pub source_transaction: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRefund {
    pub charge_id: String,
    pub reverse_transfer: bool,
    pub refund_application_fee: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub id: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates or reuses a customer keyed by email.
    async fn ensure_customer(&self, email: &str) -> ProcessorResult<String>;

    async fn retrieve_account(&self, account_id: &str) -> ProcessorResult<AccountSnapshot>;

    async fn create_product(&self, name: &str) -> ProcessorResult<String>;
    async fn create_price(&self, request: CreatePrice) -> ProcessorResult<Price>;
    async fn set_default_price(&self, product_id: &str, price_id: &str) -> ProcessorResult<()>;
    /// Deactivates a price; prices are never deleted.
    async fn archive_price(&self, price_id: &str) -> ProcessorResult<()>;

    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntent,
    ) -> ProcessorResult<PaymentIntent>;
    async fn retrieve_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent>;
    /// Subscriptions cannot carry intent metadata at creation time; it is
    /// attached to the invoice's intent afterwards.
    async fn attach_intent_metadata(
        &self,
        intent_id: &str,
        metadata: PaymentMetadata,
    ) -> ProcessorResult<()>;

    /// Creates a subscription with allow-incomplete payment behavior so an
    /// initial failed charge does not abort creation.
    async fn create_subscription(
        &self,
        request: CreateSubscription,
    ) -> ProcessorResult<SubscriptionHandle>;
    async fn retrieve_invoice_intent(&self, invoice_id: &str) -> ProcessorResult<PaymentIntent>;
    async fn cancel_subscription(&self, subscription_id: &str) -> ProcessorResult<()>;

    /// `on_account` scopes the lookup to a connected account's namespace.
    async fn retrieve_charge(
        &self,
        charge_id: &str,
        on_account: Option<&str>,
    ) -> ProcessorResult<ChargeSnapshot>;
    async fn retrieve_transfer(&self, transfer_id: &str) -> ProcessorResult<TransferSnapshot>;
    async fn create_refund(&self, request: CreateRefund) -> ProcessorResult<Refund>;
}
