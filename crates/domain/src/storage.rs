//! Storage traits implemented by the SeaORM adapter crate. Keeping them here
//! lets the services stay generic and mockable in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    CheckoutId, CheckoutRecord, ExpeditionId, ExpeditionRecord, ExplorerId, ExplorerRecord,
    FinalizeOutcome, NewCheckout, NewExpedition, NewExplorer, NewTier, SponsorshipId,
    SponsorshipRecord, TierId, TierPatch, TierRecord, TierSync,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

#[async_trait]
pub trait ExplorerStore: Send + Sync {
    async fn insert_explorer(&self, explorer: NewExplorer) -> StorageResult<ExplorerRecord>;
    async fn find_explorer(&self, id: ExplorerId) -> StorageResult<Option<ExplorerRecord>>;
    async fn find_explorer_by_handle(&self, handle: &str)
        -> StorageResult<Option<ExplorerRecord>>;
}

#[async_trait]
pub trait TierStore: Send + Sync {
    async fn insert_tier(&self, tier: NewTier) -> StorageResult<TierRecord>;
    async fn find_tier(&self, id: TierId) -> StorageResult<Option<TierRecord>>;
    /// Non-deleted tiers for a creator, slot order.
    async fn list_tiers(&self, creator: ExplorerId) -> StorageResult<Vec<TierRecord>>;
    /// Persists a patch together with the processor ids produced by a price
    /// synchronization in one statement. Returns `None` for an unknown or
    /// soft-deleted tier.
    async fn apply_tier_patch(
        &self,
        id: TierId,
        patch: TierPatch,
        sync: TierSync,
    ) -> StorageResult<Option<TierRecord>>;
}

#[async_trait]
pub trait CheckoutStore: Send + Sync {
    async fn insert_checkout(&self, checkout: NewCheckout) -> StorageResult<CheckoutRecord>;
    async fn find_checkout(&self, id: CheckoutId) -> StorageResult<Option<CheckoutRecord>>;
    /// Patches the processor payment handles onto a checkout after creation.
    async fn set_payment_handles(
        &self,
        id: CheckoutId,
        payment_intent_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> StorageResult<()>;
    /// Flips a checkout to `REFUNDED` through the legal-transition filter
    /// (pending or confirmed only). Returns `None` when no row qualified.
    async fn mark_refunded(&self, id: CheckoutId) -> StorageResult<Option<CheckoutRecord>>;
}

#[async_trait]
pub trait SponsorshipStore: Send + Sync {
    async fn find_sponsorship(&self, id: SponsorshipId)
        -> StorageResult<Option<SponsorshipRecord>>;
    /// True when the sponsor already holds an `ACTIVE` subscription-type
    /// sponsorship toward the creator.
    async fn has_active_subscription(
        &self,
        sponsor: ExplorerId,
        creator: ExplorerId,
    ) -> StorageResult<bool>;
    /// `ACTIVE -> CANCELED` compare-and-swap. Returns `None` when the row was
    /// not in a cancelable state.
    async fn cancel_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> StorageResult<Option<SponsorshipRecord>>;
}

#[async_trait]
pub trait ExpeditionStore: Send + Sync {
    async fn insert_expedition(&self, expedition: NewExpedition)
        -> StorageResult<ExpeditionRecord>;
    async fn find_expedition(&self, id: ExpeditionId) -> StorageResult<Option<ExpeditionRecord>>;
    /// The creator's most recent non-deleted expedition in a funding-eligible
    /// status (active or planned).
    async fn current_expedition(
        &self,
        creator: ExplorerId,
    ) -> StorageResult<Option<ExpeditionRecord>>;
}

/// The finalization transaction: checkout CAS, sponsorship insert, and the
/// expedition aggregate increment commit together or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Finalizes a pending checkout. The row is flipped to `CONFIRMED` only
    /// if its status is still `PENDING`; `None` means another caller already
    /// finalized it, which callers must treat as success.
    async fn finalize_checkout(
        &self,
        id: CheckoutId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<FinalizeOutcome>>;
}
