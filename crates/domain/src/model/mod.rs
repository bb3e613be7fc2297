//! Data structures shared across the API, storage, and processor crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use thiserror::Error;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(ExplorerId);
entity_id!(CheckoutId);
entity_id!(TierId);
entity_id!(SponsorshipId);
entity_id!(ExpeditionId);

/// Lifecycle of a single payment attempt. The only legal transitions are
/// `Pending -> Confirmed`, `Pending -> Refunded`, and `Confirmed -> Refunded`;
/// the storage layer enforces them with status-filtered updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    Confirmed,
    Refunded,
}

impl CheckoutStatus {
    pub fn can_transition_to(self, next: CheckoutStatus) -> bool {
        matches!(
            (self, next),
            (CheckoutStatus::Pending, CheckoutStatus::Confirmed)
                | (CheckoutStatus::Pending, CheckoutStatus::Refunded)
                | (CheckoutStatus::Confirmed, CheckoutStatus::Refunded)
        )
    }
}

/// Lifecycle of a confirmed funding relationship. `Active -> Canceled` is the
/// only transition driven by this core; subscription renewal rolls the expiry
/// forward externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SponsorshipStatus {
    Pending,
    Confirmed,
    Active,
    Canceled,
}

impl SponsorshipStatus {
    pub fn can_transition_to(self, next: SponsorshipStatus) -> bool {
        matches!(
            (self, next),
            (SponsorshipStatus::Active, SponsorshipStatus::Canceled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SponsorshipKind {
    OneTime,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

/// Billing mode of a published tier. One-time tiers fund a single checkout;
/// monthly tiers back recurring subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierBilling {
    OneTime,
    Monthly,
}

/// Fixed slot table for published tiers. Each slot carries a label and the
/// allowed price range in minor currency units; a creator holds at most one
/// tier per (billing, slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierSlot {
    Postcard,
    Basecamp,
    Trailblazer,
    Summit,
}

impl TierSlot {
    pub const ALL: [TierSlot; 4] = [
        TierSlot::Postcard,
        TierSlot::Basecamp,
        TierSlot::Trailblazer,
        TierSlot::Summit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TierSlot::Postcard => "Postcard",
            TierSlot::Basecamp => "Basecamp",
            TierSlot::Trailblazer => "Trailblazer",
            TierSlot::Summit => "Summit",
        }
    }

    /// Inclusive price bounds for the slot, in minor currency units.
    pub fn price_bounds_minor(self) -> (i64, i64) {
        match self {
            TierSlot::Postcard => (100, 1_000),
            TierSlot::Basecamp => (500, 2_500),
            TierSlot::Trailblazer => (1_000, 10_000),
            TierSlot::Summit => (2_500, 100_000),
        }
    }

    pub fn allows_price_minor(self, price_minor: i64) -> bool {
        let (min, max) = self.price_bounds_minor();
        (min..=max).contains(&price_minor)
    }

    pub fn priority(self) -> i16 {
        match self {
            TierSlot::Postcard => 1,
            TierSlot::Basecamp => 2,
            TierSlot::Trailblazer => 3,
            TierSlot::Summit => 4,
        }
    }

    pub fn from_priority(priority: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.priority() == priority)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TierSlotError {
    #[error("unknown tier slot priority {0}")]
    UnknownPriority(i16),
    #[error("price {price_minor} outside slot range {min_minor}..={max_minor}")]
    PriceOutOfRange {
        price_minor: i64,
        min_minor: i64,
        max_minor: i64,
    },
}

/// Validates a tier price against its slot's allowed range.
pub fn validate_slot_price(slot: TierSlot, price_minor: i64) -> Result<(), TierSlotError> {
    let (min_minor, max_minor) = slot.price_bounds_minor();
    if (min_minor..=max_minor).contains(&price_minor) {
        Ok(())
    } else {
        Err(TierSlotError::PriceOutOfRange {
            price_minor,
            min_minor,
            max_minor,
        })
    }
}

/// Boundary projection of the platform's user table: the fields this core
/// reads to authorize and route payments. User CRUD lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerRecord {
    pub id: ExplorerId,
    pub handle: String,
    pub email: String,
    pub email_verified: bool,
    pub connected_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExplorer {
    pub handle: String,
    pub email: String,
    pub email_verified: bool,
    pub connected_account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRecord {
    pub id: TierId,
    pub creator: ExplorerId,
    pub billing: TierBilling,
    pub slot: TierSlot,
    pub price_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub is_available: bool,
    pub product_id: Option<String>,
    pub monthly_price_id: Option<String>,
    pub yearly_price_id: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTier {
    pub creator: ExplorerId,
    pub billing: TierBilling,
    pub slot: TierSlot,
    pub price_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub is_available: bool,
}

/// Patch applied to a tier: one optional field per mutable attribute so every
/// update path is statically enumerable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TierPatch {
    pub price_minor: Option<i64>,
    pub is_available: Option<bool>,
    pub description: Option<String>,
    pub priority: Option<i16>,
}

/// Processor-side identifiers produced by a tier price synchronization,
/// persisted together with the patch in one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierSync {
    pub product_id: Option<String>,
    pub monthly_price_id: Option<String>,
    pub yearly_price_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRecord {
    pub id: CheckoutId,
    pub status: CheckoutStatus,
    pub kind: SponsorshipKind,
    pub tier: Option<TierId>,
    pub amount_minor: i64,
    pub currency: String,
    pub message: Option<String>,
    pub sponsor: ExplorerId,
    pub creator: ExplorerId,
    pub payment_intent_id: Option<String>,
    pub subscription_id: Option<String>,
    pub email_delivery: bool,
    pub is_public: bool,
    pub is_message_public: bool,
    pub expedition: Option<ExpeditionId>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckout {
    pub kind: SponsorshipKind,
    pub tier: Option<TierId>,
    pub amount_minor: i64,
    pub currency: String,
    pub message: Option<String>,
    pub sponsor: ExplorerId,
    pub creator: ExplorerId,
    pub email_delivery: bool,
    pub is_public: bool,
    pub is_message_public: bool,
    pub expedition: Option<ExpeditionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorshipRecord {
    pub id: SponsorshipId,
    pub kind: SponsorshipKind,
    pub status: SponsorshipStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub message: Option<String>,
    pub sponsor: ExplorerId,
    pub creator: ExplorerId,
    pub tier: Option<TierId>,
    pub subscription_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub email_delivery: bool,
    pub is_public: bool,
    pub is_message_public: bool,
    pub expedition: Option<ExpeditionId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExpeditionStatus {
    Planned,
    Active,
    Completed,
    Abandoned,
}

impl ExpeditionStatus {
    /// Statuses eligible to receive funding-aggregate credit.
    pub fn accepts_funding(self) -> bool {
        matches!(self, ExpeditionStatus::Planned | ExpeditionStatus::Active)
    }
}

/// Expedition projection carrying the denormalized funding aggregate
/// (`raised` in major units, `sponsors_count`). The aggregate is mutated only
/// inside the ledger finalization transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpeditionRecord {
    pub id: ExpeditionId,
    pub creator: ExplorerId,
    pub title: String,
    pub status: ExpeditionStatus,
    pub raised: i64,
    pub sponsors_count: i32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpedition {
    pub creator: ExplorerId,
    pub title: String,
    pub status: ExpeditionStatus,
}

/// Everything the ledger transaction produced, handed back to the completion
/// gateway for post-commit event publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub checkout: CheckoutRecord,
    pub sponsorship: SponsorshipRecord,
    pub credited_expedition: Option<ExpeditionId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_transitions_match_state_machine() {
        use CheckoutStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Refunded));
        assert!(Confirmed.can_transition_to(Refunded));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Confirmed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn sponsorship_only_cancels_from_active() {
        use SponsorshipStatus::*;
        assert!(Active.can_transition_to(Canceled));
        assert!(!Confirmed.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Canceled));
    }

    #[test]
    fn slot_priorities_round_trip() {
        for slot in TierSlot::ALL {
            assert_eq!(TierSlot::from_priority(slot.priority()), Some(slot));
        }
        assert_eq!(TierSlot::from_priority(0), None);
        assert_eq!(TierSlot::from_priority(9), None);
    }

    #[test]
    fn slot_price_bounds_are_inclusive() {
        assert!(validate_slot_price(TierSlot::Postcard, 100).is_ok());
        assert!(validate_slot_price(TierSlot::Postcard, 1_000).is_ok());
        assert!(validate_slot_price(TierSlot::Postcard, 99).is_err());
        assert!(validate_slot_price(TierSlot::Postcard, 1_001).is_err());
        assert!(validate_slot_price(TierSlot::Summit, 2_500).is_ok());
        assert!(validate_slot_price(TierSlot::Summit, 100_001).is_err());
    }

    #[test]
    fn only_planned_and_active_expeditions_accept_funding() {
        assert!(ExpeditionStatus::Planned.accepts_funding());
        assert!(ExpeditionStatus::Active.accepts_funding());
        assert!(!ExpeditionStatus::Completed.accepts_funding());
        assert!(!ExpeditionStatus::Abandoned.accepts_funding());
    }

    #[test]
    fn status_string_forms_are_snake_case() {
        assert_eq!(CheckoutStatus::Pending.as_ref(), "pending");
        assert_eq!(SponsorshipKind::OneTime.as_ref(), "one_time");
        assert_eq!(SponsorshipStatus::Active.as_ref(), "active");
    }
}
