//! Refund reconciliation for destination charges.
//!
//! A creator sees the *connected* charge in their own account, but the
//! refundable money lives on the platform charge that funded the transfer.
//! The chain is traced as connected charge -> source transfer -> platform
//! transfer -> source transaction; any break aborts with a descriptive error
//! and no refund call. The refund reverses the transfer and returns the
//! platform fee, then the originating checkout (when the transfer metadata
//! names one) is flipped to `REFUNDED`.

use metrics::counter;
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::model::CheckoutId;
use crate::processor::{CreateRefund, PaymentProcessor, METADATA_CHECKOUT_ID};
use crate::services::events::{publish, EventSender, SponsorshipEvent};
use crate::storage::{CheckoutStore, ExplorerStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    pub refund_id: String,
    /// The checkout flipped to `REFUNDED`, when the transfer named one and
    /// the transition was legal.
    pub checkout: Option<CheckoutId>,
}

pub async fn refund_charge<S, P>(
    storage: &S,
    processor: &P,
    events: &EventSender,
    caller: crate::model::ExplorerId,
    charge_id: &str,
    reason: Option<String>,
) -> ServiceResult<RefundOutcome>
where
    S: ExplorerStore + CheckoutStore,
    P: PaymentProcessor + ?Sized,
{
    let creator = storage
        .find_explorer(caller)
        .await?
        .ok_or(ServiceError::NotFound("caller"))?;
    let account = creator
        .connected_account_id
        .clone()
        .ok_or(ServiceError::Forbidden)?;

    // The charge id the creator sees lives in their connected account's
    // namespace, so the lookup must be scoped there.
    let charge = processor.retrieve_charge(charge_id, Some(&account)).await?;
    if charge.refunded {
        counter!("refunds_total", "status" => "already_refunded").increment(1);
        return Err(ServiceError::validation("this charge is already refunded"));
    }

    let source_transfer = charge.source_transfer.clone().ok_or_else(|| {
        counter!("refunds_total", "status" => "chain_break").increment(1);
        ServiceError::validation(
            "charge has no source transfer; it did not originate from a sponsorship payment",
        )
    })?;
    let transfer = processor.retrieve_transfer(&source_transfer).await?;
    let platform_charge = transfer.source_transaction.clone().ok_or_else(|| {
        counter!("refunds_total", "status" => "chain_break").increment(1);
        ServiceError::validation(
            "transfer has no source transaction; the platform charge cannot be located",
        )
    })?;

    let refund = processor
        .create_refund(CreateRefund {
            charge_id: platform_charge.clone(),
            reverse_transfer: true,
            refund_application_fee: true,
            reason,
        })
        .await?;

    let checkout = match transfer
        .metadata
        .get(METADATA_CHECKOUT_ID)
        .and_then(|value| value.parse::<i64>().ok())
        .map(CheckoutId)
    {
        Some(checkout_id) => match storage.mark_refunded(checkout_id).await? {
            Some(record) => {
                publish(events, SponsorshipEvent::Refunded { checkout: record });
                Some(checkout_id)
            }
            None => {
                // Unknown id or an illegal transition (already refunded);
                // the processor refund stands either way.
                warn!(checkout = %checkout_id, refund = refund.id, "refund could not flip checkout");
                None
            }
        },
        None => None,
    };

    counter!("refunds_total", "status" => "refunded").increment(1);
    info!(
        refund = refund.id,
        connected_charge = charge_id,
        platform_charge,
        checkout = checkout.map(|id| id.to_string()),
        "charge refunded"
    );

    Ok(RefundOutcome {
        refund_id: refund.id,
        checkout,
    })
}
