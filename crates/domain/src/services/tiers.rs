//! Tier management and processor price synchronization.
//!
//! Tier rows own their processor mirror (product + monthly/yearly recurring
//! prices). Whenever the monthly amount changes, fresh price objects are
//! created, the product's default price is switched over, and only then are
//! the replaced prices archived, so the public product never points at a
//! dead price. A stale product id (environment mismatch) self-heals by
//! recreating the product and both prices.

use metrics::counter;
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::model::{
    validate_slot_price, ExplorerId, NewTier, TierBilling, TierId, TierPatch, TierRecord,
    TierSlot, TierSync,
};
use crate::money::yearly_price_minor;
use crate::processor::{CreatePrice, PaymentProcessor, PriceInterval};
use crate::services::checkout::require_ready_account;
use crate::storage::{ExplorerStore, TierStore};

/// Returns the creator's published tiers in slot order, creating the default
/// hidden monthly tier on first access.
pub async fn list_tiers<S>(storage: &S, creator: ExplorerId) -> ServiceResult<Vec<TierRecord>>
where
    S: TierStore,
{
    let tiers = storage.list_tiers(creator).await?;
    if !tiers.is_empty() {
        return Ok(tiers);
    }

    let slot = TierSlot::Basecamp;
    let (min_price, _) = slot.price_bounds_minor();
    storage
        .insert_tier(NewTier {
            creator,
            billing: TierBilling::Monthly,
            slot,
            price_minor: min_price,
            currency: "usd".to_string(),
            description: None,
            is_available: false,
        })
        .await?;
    info!(creator = %creator, "created default hidden tier");
    Ok(storage.list_tiers(creator).await?)
}

/// Applies a patch to a creator-owned tier, synchronizing processor prices
/// when the monthly amount changes (or either recurring price was never
/// published). A sync requires the creator's connected account to be ready;
/// patches that never touch the processor carry no such requirement. The
/// patch and the resulting processor ids are persisted in one statement.
pub async fn upsert_tier<S, P>(
    storage: &S,
    processor: &P,
    currency: &str,
    caller: ExplorerId,
    tier_id: TierId,
    patch: TierPatch,
) -> ServiceResult<TierRecord>
where
    S: ExplorerStore + TierStore,
    P: PaymentProcessor + ?Sized,
{
    let tier = storage
        .find_tier(tier_id)
        .await?
        .filter(|tier| tier.deleted_at.is_none())
        .ok_or(ServiceError::NotFound("sponsorship tier"))?;
    if tier.creator != caller {
        return Err(ServiceError::Forbidden);
    }

    let slot = match patch.priority {
        Some(priority) => TierSlot::from_priority(priority).ok_or_else(|| {
            ServiceError::validation(format!("unknown tier priority {priority}"))
        })?,
        None => tier.slot,
    };
    let price_minor = patch.price_minor.unwrap_or(tier.price_minor);
    validate_slot_price(slot, price_minor)
        .map_err(|err| ServiceError::validation(err.to_string()))?;

    let price_changed = price_minor != tier.price_minor;
    let needs_sync = tier.billing == TierBilling::Monthly
        && (price_changed
            || tier.monthly_price_id.is_none()
            || tier.yearly_price_id.is_none());

    let sync = if needs_sync {
        let creator = storage
            .find_explorer(caller)
            .await?
            .ok_or(ServiceError::NotFound("creator"))?;
        require_ready_account(processor, &creator).await?;
        sync_prices(processor, currency, &tier, price_minor).await?
    } else {
        TierSync::default()
    };

    let updated = storage
        .apply_tier_patch(tier_id, patch, sync)
        .await?
        .ok_or(ServiceError::NotFound("sponsorship tier"))?;

    counter!("tier_updates_total", "synced" => if needs_sync { "yes" } else { "no" })
        .increment(1);
    info!(tier = %tier_id, creator = %caller, price_minor, synced = needs_sync, "tier updated");
    Ok(updated)
}

/// Regenerates the processor price pair for a monthly tier. The returned
/// sync always carries all three ids.
async fn sync_prices<P>(
    processor: &P,
    currency: &str,
    tier: &TierRecord,
    price_minor: i64,
) -> ServiceResult<TierSync>
where
    P: PaymentProcessor + ?Sized,
{
    let (product_id, monthly, yearly) = match tier.product_id.clone() {
        Some(product_id) => {
            match create_price_pair(processor, currency, &product_id, price_minor).await {
                Ok((monthly, yearly)) => (product_id, monthly, yearly),
                // The recorded product no longer exists on the processor
                // (environment or account mismatch). Recreate it and retry.
                Err(err) if err.is_missing() => {
                    warn!(tier = %tier.id, product = product_id, "product missing, recreating");
                    counter!("tier_sync_heals_total").increment(1);
                    create_product_and_prices(processor, currency, tier, price_minor).await?
                }
                Err(err) => return Err(err.into()),
            }
        }
        None => create_product_and_prices(processor, currency, tier, price_minor).await?,
    };

    // Switch the default before touching the old prices so the product is
    // never left pointing at an archived price.
    processor.set_default_price(&product_id, &monthly).await?;
    if let Some(old) = tier.monthly_price_id.as_deref() {
        processor.archive_price(old).await?;
    }
    if let Some(old) = tier.yearly_price_id.as_deref() {
        processor.archive_price(old).await?;
    }

    Ok(TierSync {
        product_id: Some(product_id),
        monthly_price_id: Some(monthly),
        yearly_price_id: Some(yearly),
    })
}

async fn create_product_and_prices<P>(
    processor: &P,
    currency: &str,
    tier: &TierRecord,
    price_minor: i64,
) -> Result<(String, String, String), crate::processor::ProcessorError>
where
    P: PaymentProcessor + ?Sized,
{
    let product_id = processor
        .create_product(&format!("{} tier", tier.slot.label()))
        .await?;
    let (monthly, yearly) =
        create_price_pair(processor, currency, &product_id, price_minor).await?;
    Ok((product_id, monthly, yearly))
}

async fn create_price_pair<P>(
    processor: &P,
    currency: &str,
    product_id: &str,
    price_minor: i64,
) -> Result<(String, String), crate::processor::ProcessorError>
where
    P: PaymentProcessor + ?Sized,
{
    let monthly = processor
        .create_price(CreatePrice {
            product_id: product_id.to_string(),
            amount_minor: price_minor,
            currency: currency.to_string(),
            interval: Some(PriceInterval::Month),
        })
        .await?;
    let yearly = processor
        .create_price(CreatePrice {
            product_id: product_id.to_string(),
            amount_minor: yearly_price_minor(price_minor),
            currency: currency.to_string(),
            interval: Some(PriceInterval::Year),
        })
        .await?;
    Ok((monthly.id, yearly.id))
}
