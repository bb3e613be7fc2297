//! Checkout orchestration: validates a sponsorship request, records a durable
//! `Checkout` row, and obtains a client-confirmable payment handle from the
//! processor.
//!
//! No ledger mutation happens here; the browser confirms the payment against
//! the processor directly and the completion gateway finalizes it. A
//! processor failure after the row insert leaves the row `PENDING` (there is
//! no sweeper in this core); the deterministic idempotency key keeps a
//! retried creation from double-charging.

use metrics::counter;
use serde::Deserialize;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::model::{
    BillingPeriod, CheckoutId, ExpeditionId, ExplorerId, ExplorerRecord, NewCheckout,
    SponsorshipKind, TierBilling, TierId, TierRecord,
};
use crate::money::{
    one_time_idempotency_key, subscription_idempotency_key, validate_custom_subscription_amount,
    validate_one_time_amount, yearly_price_minor, FeeSchedule, ONE_TIME_MAX_MINOR,
    ONE_TIME_MIN_MINOR,
};
use crate::processor::{
    CreatePaymentIntent, CreatePrice, CreateSubscription, PaymentMetadata, PaymentProcessor,
    PriceInterval,
};
use crate::storage::{CheckoutStore, ExplorerStore, SponsorshipStore, TierStore};

#[derive(Debug, Clone, Deserialize)]
pub struct BeginCheckoutRequest {
    pub sponsorship_type: SponsorshipKind,
    pub creator_handle: String,
    pub payment_method_id: String,
    #[serde(default)]
    pub sponsorship_tier_id: Option<TierId>,
    /// One-time amount in decimal major units.
    #[serde(default)]
    pub one_time_payment_amount: Option<f64>,
    /// Custom subscription amount in decimal major units.
    #[serde(default)]
    pub custom_amount: Option<f64>,
    #[serde(default)]
    pub billing_period: Option<BillingPeriod>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_true")]
    pub email_delivery: bool,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_true")]
    pub is_message_public: bool,
    #[serde(default)]
    pub expedition_id: Option<ExpeditionId>,
}

fn default_true() -> bool {
    true
}

/// Handle returned to the browser; the client secret is confirmed against
/// the processor SDK directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub checkout: CheckoutId,
    pub client_secret: String,
    pub payment_method_id: String,
}

pub async fn begin_checkout<S, P>(
    storage: &S,
    processor: &P,
    fees: FeeSchedule,
    currency: &str,
    sponsor_id: ExplorerId,
    request: BeginCheckoutRequest,
) -> ServiceResult<CheckoutSession>
where
    S: ExplorerStore + TierStore + CheckoutStore + SponsorshipStore,
    P: PaymentProcessor + ?Sized,
{
    let sponsor = storage
        .find_explorer(sponsor_id)
        .await?
        .ok_or(ServiceError::NotFound("sponsor"))?;
    let creator = storage
        .find_explorer_by_handle(&request.creator_handle)
        .await?
        .ok_or(ServiceError::NotFound("creator"))?;

    if sponsor.id == creator.id {
        counter!("checkout_requests_total", "status" => "self_sponsorship").increment(1);
        return Err(ServiceError::SelfSponsorship);
    }

    let tier = match request.sponsorship_tier_id {
        Some(id) => Some(resolve_tier(storage, id, &creator, request.sponsorship_type).await?),
        None => None,
    };

    match request.sponsorship_type {
        SponsorshipKind::OneTime => {
            begin_one_time(storage, processor, fees, currency, sponsor, creator, tier, request)
                .await
        }
        SponsorshipKind::Subscription => {
            begin_subscription(storage, processor, fees, currency, sponsor, creator, tier, request)
                .await
        }
    }
}

async fn resolve_tier<S>(
    storage: &S,
    id: TierId,
    creator: &ExplorerRecord,
    kind: SponsorshipKind,
) -> ServiceResult<TierRecord>
where
    S: TierStore,
{
    let tier = storage
        .find_tier(id)
        .await?
        .filter(|tier| tier.deleted_at.is_none())
        .ok_or(ServiceError::NotFound("sponsorship tier"))?;
    if tier.creator != creator.id {
        return Err(ServiceError::NotFound("sponsorship tier"));
    }
    if !tier.is_available {
        return Err(ServiceError::validation(
            "this sponsorship tier is not available",
        ));
    }
    let expected = match kind {
        SponsorshipKind::OneTime => TierBilling::OneTime,
        SponsorshipKind::Subscription => TierBilling::Monthly,
    };
    if tier.billing != expected {
        return Err(ServiceError::validation(
            "tier billing mode does not match the sponsorship type",
        ));
    }
    Ok(tier)
}

/// Verifies the creator's connected account is verified, charge-enabled,
/// payout-enabled, and free of pending requirements. Shared with the tier
/// price sync, which must not publish prices for an unpayable creator.
pub(super) async fn require_ready_account<P>(
    processor: &P,
    creator: &ExplorerRecord,
) -> ServiceResult<String>
where
    P: PaymentProcessor + ?Sized,
{
    let account_id = creator.connected_account_id.clone().ok_or_else(|| {
        ServiceError::validation("this creator is not set up to receive sponsorships")
    })?;
    let account = processor.retrieve_account(&account_id).await?;
    if !account.ready_for_payments() {
        counter!("account_readiness_checks_total", "status" => "not_ready").increment(1);
        return Err(ServiceError::validation(
            "the creator's payment account cannot accept sponsorships yet",
        ));
    }
    Ok(account.id)
}

#[allow(clippy::too_many_arguments)]
async fn begin_one_time<S, P>(
    storage: &S,
    processor: &P,
    fees: FeeSchedule,
    currency: &str,
    sponsor: ExplorerRecord,
    creator: ExplorerRecord,
    tier: Option<TierRecord>,
    request: BeginCheckoutRequest,
) -> ServiceResult<CheckoutSession>
where
    S: CheckoutStore,
    P: PaymentProcessor + ?Sized,
{
    // Amount validation happens before any processor call.
    let amount_minor = match request.one_time_payment_amount {
        Some(major) => validate_one_time_amount(major)
            .map_err(|err| ServiceError::validation(err.to_string()))?,
        None => {
            let tier = tier
                .as_ref()
                .ok_or_else(|| ServiceError::validation("an amount or tier is required"))?;
            if !(ONE_TIME_MIN_MINOR..=ONE_TIME_MAX_MINOR).contains(&tier.price_minor) {
                return Err(ServiceError::validation(
                    "tier price is outside the allowed one-time range",
                ));
            }
            tier.price_minor
        }
    };

    let destination = require_ready_account(processor, &creator).await?;
    let customer_id = processor.ensure_customer(&sponsor.email).await?;

    // The row is created first so its id can seed the idempotency key and the
    // intent metadata; a failed payment still leaves an audit row.
    let checkout = storage
        .insert_checkout(NewCheckout {
            kind: SponsorshipKind::OneTime,
            tier: tier.as_ref().map(|tier| tier.id),
            amount_minor,
            currency: currency.to_string(),
            message: request.message.clone(),
            sponsor: sponsor.id,
            creator: creator.id,
            email_delivery: request.email_delivery,
            is_public: request.is_public,
            is_message_public: request.is_message_public,
            expedition: request.expedition_id,
        })
        .await?;

    let metadata = PaymentMetadata {
        checkout: checkout.id,
        sponsor: sponsor.id,
        creator: creator.id,
    };
    // Metadata rides on the creation call itself so the intent never exists
    // without traceable ids.
    let intent = processor
        .create_payment_intent(CreatePaymentIntent {
            amount_minor,
            currency: currency.to_string(),
            customer_id,
            payment_method_id: request.payment_method_id.clone(),
            destination_account: destination,
            application_fee_minor: fees.application_fee_minor(amount_minor),
            metadata,
            idempotency_key: one_time_idempotency_key(checkout.id),
        })
        .await?;

    storage
        .set_payment_handles(checkout.id, Some(&intent.id), None)
        .await?;

    let client_secret = intent.client_secret.ok_or_else(|| {
        ServiceError::internal("processor returned a payment intent without a client secret")
    })?;

    counter!("checkout_requests_total", "kind" => "one_time", "status" => "created").increment(1);
    info!(checkout = %checkout.id, creator = %creator.id, amount_minor, "one-time checkout created");

    Ok(CheckoutSession {
        checkout: checkout.id,
        client_secret,
        payment_method_id: request.payment_method_id,
    })
}

#[allow(clippy::too_many_arguments)]
async fn begin_subscription<S, P>(
    storage: &S,
    processor: &P,
    fees: FeeSchedule,
    currency: &str,
    sponsor: ExplorerRecord,
    creator: ExplorerRecord,
    tier: Option<TierRecord>,
    request: BeginCheckoutRequest,
) -> ServiceResult<CheckoutSession>
where
    S: CheckoutStore + SponsorshipStore,
    P: PaymentProcessor + ?Sized,
{
    // Duplicate and amount checks run before any processor contact.
    if storage
        .has_active_subscription(sponsor.id, creator.id)
        .await?
    {
        counter!("checkout_requests_total", "status" => "duplicate_subscription").increment(1);
        return Err(ServiceError::validation(
            "you already have an active subscription for this creator",
        ));
    }

    let tier = tier.ok_or_else(|| {
        ServiceError::validation("a sponsorship tier is required for subscriptions")
    })?;

    let custom_minor = request
        .custom_amount
        .map(validate_custom_subscription_amount)
        .transpose()
        .map_err(|err| ServiceError::validation(err.to_string()))?;

    let destination = require_ready_account(processor, &creator).await?;
    let customer_id = processor.ensure_customer(&sponsor.email).await?;

    let (price_id, amount_minor) = match custom_minor {
        Some(minor) => {
            // Custom amounts get a dedicated recurring price object.
            let product_id = match tier.product_id.clone() {
                Some(id) => id,
                None => {
                    processor
                        .create_product(&format!(
                            "{} tier for {}",
                            tier.slot.label(),
                            creator.handle
                        ))
                        .await?
                }
            };
            let price = processor
                .create_price(CreatePrice {
                    product_id,
                    amount_minor: minor,
                    currency: currency.to_string(),
                    interval: Some(PriceInterval::Month),
                })
                .await?;
            (price.id, minor)
        }
        None => match request.billing_period.unwrap_or(BillingPeriod::Monthly) {
            BillingPeriod::Monthly => {
                let id = tier.monthly_price_id.clone().ok_or_else(|| {
                    ServiceError::validation("tier has no published monthly price")
                })?;
                (id, tier.price_minor)
            }
            BillingPeriod::Yearly => match tier.yearly_price_id.clone() {
                Some(id) => (id, yearly_price_minor(tier.price_minor)),
                None => {
                    // No explicit yearly price; derive one from the monthly
                    // amount with the fixed multi-month discount.
                    let product_id = tier.product_id.clone().ok_or_else(|| {
                        ServiceError::validation("tier has no published prices yet")
                    })?;
                    let amount = yearly_price_minor(tier.price_minor);
                    let price = processor
                        .create_price(CreatePrice {
                            product_id,
                            amount_minor: amount,
                            currency: currency.to_string(),
                            interval: Some(PriceInterval::Year),
                        })
                        .await?;
                    (price.id, amount)
                }
            },
        },
    };

    let checkout = storage
        .insert_checkout(NewCheckout {
            kind: SponsorshipKind::Subscription,
            tier: Some(tier.id),
            amount_minor,
            currency: currency.to_string(),
            message: request.message.clone(),
            sponsor: sponsor.id,
            creator: creator.id,
            email_delivery: request.email_delivery,
            is_public: request.is_public,
            is_message_public: request.is_message_public,
            expedition: request.expedition_id,
        })
        .await?;

    let subscription = processor
        .create_subscription(CreateSubscription {
            customer_id,
            price_id,
            payment_method_id: request.payment_method_id.clone(),
            destination_account: destination,
            application_fee_percent: fees.percent(),
            idempotency_key: subscription_idempotency_key(checkout.id),
        })
        .await?;

    let invoice_id = subscription.latest_invoice_id.clone().ok_or_else(|| {
        ServiceError::internal("processor returned a subscription without an invoice")
    })?;
    let intent = processor.retrieve_invoice_intent(&invoice_id).await?;

    storage
        .set_payment_handles(checkout.id, Some(&intent.id), Some(&subscription.id))
        .await?;

    // Subscriptions cannot carry intent metadata at creation time; attach it
    // now so both completion triggers can trace the intent back.
    let metadata = PaymentMetadata {
        checkout: checkout.id,
        sponsor: sponsor.id,
        creator: creator.id,
    };
    processor.attach_intent_metadata(&intent.id, metadata).await?;

    let client_secret = intent.client_secret.ok_or_else(|| {
        ServiceError::internal("processor returned an invoice intent without a client secret")
    })?;

    counter!("checkout_requests_total", "kind" => "subscription", "status" => "created")
        .increment(1);
    info!(
        checkout = %checkout.id,
        creator = %creator.id,
        subscription = %subscription.id,
        amount_minor,
        "subscription checkout created"
    );

    Ok(CheckoutSession {
        checkout: checkout.id,
        client_secret,
        payment_method_id: request.payment_method_id,
    })
}
