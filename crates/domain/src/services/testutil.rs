//! In-memory store and scripted processor shared by the service test modules.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};

use crate::model::{
    CheckoutId, CheckoutRecord, CheckoutStatus, ExpeditionId, ExpeditionRecord, ExpeditionStatus,
    ExplorerId, ExplorerRecord, FinalizeOutcome, NewCheckout, NewExpedition, NewExplorer, NewTier,
    SponsorshipId, SponsorshipKind, SponsorshipRecord, SponsorshipStatus, TierBilling, TierId,
    TierPatch, TierRecord, TierSlot, TierSync,
};
use crate::money::minor_to_major;
use crate::processor::{
    AccountSnapshot, ChargeSnapshot, CreatePaymentIntent, CreatePrice, CreateRefund,
    CreateSubscription, IntentStatus, PaymentIntent, PaymentMetadata, PaymentProcessor, Price,
    PriceInterval, ProcessorError, ProcessorResult, Refund, SubscriptionHandle, TransferSnapshot,
};
use crate::storage::{
    CheckoutStore, ExplorerStore, ExpeditionStore, LedgerStore, SponsorshipStore, StorageResult,
    TierStore,
};

#[derive(Default)]
pub struct MockStore {
    next_id: AtomicI64,
    explorers: Mutex<Vec<ExplorerRecord>>,
    tiers: Mutex<Vec<TierRecord>>,
    checkouts: Mutex<Vec<CheckoutRecord>>,
    sponsorships: Mutex<Vec<SponsorshipRecord>>,
    expeditions: Mutex<Vec<ExpeditionRecord>>,
}

impl MockStore {
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn add_explorer(
        &self,
        handle: &str,
        email: &str,
        email_verified: bool,
        connected_account_id: Option<&str>,
    ) -> ExplorerRecord {
        let record = ExplorerRecord {
            id: ExplorerId(self.next_id()),
            handle: handle.to_string(),
            email: email.to_string(),
            email_verified,
            connected_account_id: connected_account_id.map(str::to_string),
            created_at: Utc::now(),
        };
        self.explorers.lock().unwrap().push(record.clone());
        record
    }

    pub fn add_tier(
        &self,
        creator: ExplorerId,
        billing: TierBilling,
        slot: TierSlot,
        price_minor: i64,
    ) -> TierRecord {
        let record = TierRecord {
            id: TierId(self.next_id()),
            creator,
            billing,
            slot,
            price_minor,
            currency: "usd".to_string(),
            description: None,
            is_available: true,
            product_id: None,
            monthly_price_id: None,
            yearly_price_id: None,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.tiers.lock().unwrap().push(record.clone());
        record
    }

    pub fn add_synced_tier(
        &self,
        creator: ExplorerId,
        slot: TierSlot,
        price_minor: i64,
        product_id: &str,
        monthly_price_id: &str,
        yearly_price_id: Option<&str>,
    ) -> TierRecord {
        let mut record = self.add_tier(creator, TierBilling::Monthly, slot, price_minor);
        record.product_id = Some(product_id.to_string());
        record.monthly_price_id = Some(monthly_price_id.to_string());
        record.yearly_price_id = yearly_price_id.map(str::to_string);
        let mut tiers = self.tiers.lock().unwrap();
        let slot_index = tiers.iter().position(|t| t.id == record.id).unwrap();
        tiers[slot_index] = record.clone();
        record
    }

    pub fn add_expedition(
        &self,
        creator: ExplorerId,
        title: &str,
        status: ExpeditionStatus,
    ) -> ExpeditionRecord {
        let record = ExpeditionRecord {
            id: ExpeditionId(self.next_id()),
            creator,
            title: title.to_string(),
            status,
            raised: 0,
            sponsors_count: 0,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.expeditions.lock().unwrap().push(record.clone());
        record
    }

    pub fn add_active_subscription(
        &self,
        sponsor: ExplorerId,
        creator: ExplorerId,
    ) -> SponsorshipRecord {
        let record = SponsorshipRecord {
            id: SponsorshipId(self.next_id()),
            kind: SponsorshipKind::Subscription,
            status: SponsorshipStatus::Active,
            amount_minor: 1_000,
            currency: "usd".to_string(),
            message: None,
            sponsor,
            creator,
            tier: None,
            subscription_id: Some("sub_seed".to_string()),
            expires_at: Utc::now().checked_add_months(Months::new(1)),
            email_delivery: true,
            is_public: true,
            is_message_public: true,
            expedition: None,
            created_at: Utc::now(),
        };
        self.sponsorships.lock().unwrap().push(record.clone());
        record
    }

    pub fn add_pending_checkout(&self, new: NewCheckout) -> CheckoutRecord {
        let record = CheckoutRecord {
            id: CheckoutId(self.next_id()),
            status: CheckoutStatus::Pending,
            kind: new.kind,
            tier: new.tier,
            amount_minor: new.amount_minor,
            currency: new.currency,
            message: new.message,
            sponsor: new.sponsor,
            creator: new.creator,
            payment_intent_id: None,
            subscription_id: None,
            email_delivery: new.email_delivery,
            is_public: new.is_public,
            is_message_public: new.is_message_public,
            expedition: new.expedition,
            confirmed_at: None,
            created_at: Utc::now(),
        };
        self.checkouts.lock().unwrap().push(record.clone());
        record
    }

    pub fn checkout(&self, id: CheckoutId) -> Option<CheckoutRecord> {
        self.checkouts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn checkouts(&self) -> Vec<CheckoutRecord> {
        self.checkouts.lock().unwrap().clone()
    }

    pub fn sponsorships(&self) -> Vec<SponsorshipRecord> {
        self.sponsorships.lock().unwrap().clone()
    }

    pub fn sponsorship(&self, id: SponsorshipId) -> Option<SponsorshipRecord> {
        self.sponsorships
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn expedition(&self, id: ExpeditionId) -> Option<ExpeditionRecord> {
        self.expeditions
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn tier(&self, id: TierId) -> Option<TierRecord> {
        self.tiers.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    pub fn set_checkout_status(&self, id: CheckoutId, status: CheckoutStatus) {
        let mut checkouts = self.checkouts.lock().unwrap();
        if let Some(row) = checkouts.iter_mut().find(|c| c.id == id) {
            row.status = status;
        }
    }
}

#[async_trait]
impl ExplorerStore for MockStore {
    async fn insert_explorer(&self, explorer: NewExplorer) -> StorageResult<ExplorerRecord> {
        Ok(self.add_explorer(
            &explorer.handle,
            &explorer.email,
            explorer.email_verified,
            explorer.connected_account_id.as_deref(),
        ))
    }

    async fn find_explorer(&self, id: ExplorerId) -> StorageResult<Option<ExplorerRecord>> {
        Ok(self
            .explorers
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn find_explorer_by_handle(
        &self,
        handle: &str,
    ) -> StorageResult<Option<ExplorerRecord>> {
        Ok(self
            .explorers
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.handle == handle)
            .cloned())
    }
}

#[async_trait]
impl TierStore for MockStore {
    async fn insert_tier(&self, tier: NewTier) -> StorageResult<TierRecord> {
        let record = TierRecord {
            id: TierId(self.next_id()),
            creator: tier.creator,
            billing: tier.billing,
            slot: tier.slot,
            price_minor: tier.price_minor,
            currency: tier.currency,
            description: tier.description,
            is_available: tier.is_available,
            product_id: None,
            monthly_price_id: None,
            yearly_price_id: None,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.tiers.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_tier(&self, id: TierId) -> StorageResult<Option<TierRecord>> {
        Ok(self.tier(id))
    }

    async fn list_tiers(&self, creator: ExplorerId) -> StorageResult<Vec<TierRecord>> {
        let mut tiers: Vec<TierRecord> = self
            .tiers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.creator == creator && t.deleted_at.is_none())
            .cloned()
            .collect();
        tiers.sort_by_key(|t| t.slot.priority());
        Ok(tiers)
    }

    async fn apply_tier_patch(
        &self,
        id: TierId,
        patch: TierPatch,
        sync: TierSync,
    ) -> StorageResult<Option<TierRecord>> {
        let mut tiers = self.tiers.lock().unwrap();
        let Some(row) = tiers
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
        else {
            return Ok(None);
        };
        if let Some(price) = patch.price_minor {
            row.price_minor = price;
        }
        if let Some(available) = patch.is_available {
            row.is_available = available;
        }
        if let Some(description) = patch.description {
            row.description = Some(description);
        }
        if let Some(priority) = patch.priority {
            if let Some(slot) = TierSlot::from_priority(priority) {
                row.slot = slot;
            }
        }
        if sync.product_id.is_some() {
            row.product_id = sync.product_id;
        }
        if sync.monthly_price_id.is_some() {
            row.monthly_price_id = sync.monthly_price_id;
        }
        if sync.yearly_price_id.is_some() {
            row.yearly_price_id = sync.yearly_price_id;
        }
        Ok(Some(row.clone()))
    }
}

#[async_trait]
impl CheckoutStore for MockStore {
    async fn insert_checkout(&self, checkout: NewCheckout) -> StorageResult<CheckoutRecord> {
        Ok(self.add_pending_checkout(checkout))
    }

    async fn find_checkout(&self, id: CheckoutId) -> StorageResult<Option<CheckoutRecord>> {
        Ok(self.checkout(id))
    }

    async fn set_payment_handles(
        &self,
        id: CheckoutId,
        payment_intent_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> StorageResult<()> {
        let mut checkouts = self.checkouts.lock().unwrap();
        if let Some(row) = checkouts.iter_mut().find(|c| c.id == id) {
            if let Some(intent) = payment_intent_id {
                row.payment_intent_id = Some(intent.to_string());
            }
            if let Some(subscription) = subscription_id {
                row.subscription_id = Some(subscription.to_string());
            }
        }
        Ok(())
    }

    async fn mark_refunded(&self, id: CheckoutId) -> StorageResult<Option<CheckoutRecord>> {
        let mut checkouts = self.checkouts.lock().unwrap();
        let Some(row) = checkouts.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if !row.status.can_transition_to(CheckoutStatus::Refunded) {
            return Ok(None);
        }
        row.status = CheckoutStatus::Refunded;
        Ok(Some(row.clone()))
    }
}

#[async_trait]
impl SponsorshipStore for MockStore {
    async fn find_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> StorageResult<Option<SponsorshipRecord>> {
        Ok(self.sponsorship(id))
    }

    async fn has_active_subscription(
        &self,
        sponsor: ExplorerId,
        creator: ExplorerId,
    ) -> StorageResult<bool> {
        Ok(self.sponsorships.lock().unwrap().iter().any(|s| {
            s.sponsor == sponsor
                && s.creator == creator
                && s.kind == SponsorshipKind::Subscription
                && s.status == SponsorshipStatus::Active
        }))
    }

    async fn cancel_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> StorageResult<Option<SponsorshipRecord>> {
        let mut sponsorships = self.sponsorships.lock().unwrap();
        let Some(row) = sponsorships.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if !row.status.can_transition_to(SponsorshipStatus::Canceled) {
            return Ok(None);
        }
        row.status = SponsorshipStatus::Canceled;
        Ok(Some(row.clone()))
    }
}

#[async_trait]
impl ExpeditionStore for MockStore {
    async fn insert_expedition(
        &self,
        expedition: NewExpedition,
    ) -> StorageResult<ExpeditionRecord> {
        Ok(self.add_expedition(expedition.creator, &expedition.title, expedition.status))
    }

    async fn find_expedition(&self, id: ExpeditionId) -> StorageResult<Option<ExpeditionRecord>> {
        Ok(self.expedition(id))
    }

    async fn current_expedition(
        &self,
        creator: ExplorerId,
    ) -> StorageResult<Option<ExpeditionRecord>> {
        Ok(self
            .expeditions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| {
                e.creator == creator && e.deleted_at.is_none() && e.status.accepts_funding()
            })
            .cloned())
    }
}

#[async_trait]
impl LedgerStore for MockStore {
    async fn finalize_checkout(
        &self,
        id: CheckoutId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<FinalizeOutcome>> {
        let checkout = {
            let mut checkouts = self.checkouts.lock().unwrap();
            let Some(row) = checkouts.iter_mut().find(|c| c.id == id) else {
                return Ok(None);
            };
            if row.status != CheckoutStatus::Pending {
                return Ok(None);
            }
            row.status = CheckoutStatus::Confirmed;
            row.confirmed_at = Some(now);
            row.clone()
        };

        let (status, expires_at) = match checkout.kind {
            SponsorshipKind::OneTime => (SponsorshipStatus::Confirmed, None),
            SponsorshipKind::Subscription => (
                SponsorshipStatus::Active,
                now.checked_add_months(Months::new(1)),
            ),
        };
        let sponsorship = SponsorshipRecord {
            id: SponsorshipId(self.next_id()),
            kind: checkout.kind,
            status,
            amount_minor: checkout.amount_minor,
            currency: checkout.currency.clone(),
            message: checkout.message.clone(),
            sponsor: checkout.sponsor,
            creator: checkout.creator,
            tier: checkout.tier,
            subscription_id: checkout.subscription_id.clone(),
            expires_at,
            email_delivery: checkout.email_delivery,
            is_public: checkout.is_public,
            is_message_public: checkout.is_message_public,
            expedition: checkout.expedition,
            created_at: now,
        };
        self.sponsorships.lock().unwrap().push(sponsorship.clone());

        // Credit the named expedition when still fundable, otherwise the
        // creator's most recent fundable one.
        let mut credited_expedition = None;
        {
            let mut expeditions = self.expeditions.lock().unwrap();
            let target = match checkout.expedition {
                Some(id) => expeditions
                    .iter_mut()
                    .find(|e| e.id == id && e.deleted_at.is_none() && e.status.accepts_funding()),
                None => expeditions.iter_mut().rev().find(|e| {
                    e.creator == checkout.creator
                        && e.deleted_at.is_none()
                        && e.status.accepts_funding()
                }),
            };
            if let Some(row) = target {
                row.raised += minor_to_major(checkout.amount_minor);
                row.sponsors_count += 1;
                credited_expedition = Some(row.id);
            }
        }

        Ok(Some(FinalizeOutcome {
            checkout,
            sponsorship,
            credited_expedition,
        }))
    }
}

/// Scripted processor double. Every call appends a line to an ordered log so
/// tests can assert both arguments and sequencing.
pub struct MockProcessor {
    counter: AtomicU64,
    calls: Mutex<Vec<String>>,
    account_ready: AtomicBool,
    intents: Mutex<HashMap<String, PaymentIntent>>,
    missing_products: Mutex<HashSet<String>>,
    charges: Mutex<HashMap<String, ChargeSnapshot>>,
    transfers: Mutex<HashMap<String, TransferSnapshot>>,
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self {
            counter: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
            account_ready: AtomicBool::new(true),
            intents: Mutex::new(HashMap::new()),
            missing_products: Mutex::new(HashSet::new()),
            charges: Mutex::new(HashMap::new()),
            transfers: Mutex::new(HashMap::new()),
        }
    }
}

impl MockProcessor {
    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_account_ready(&self, ready: bool) {
        self.account_ready.store(ready, Ordering::SeqCst);
    }

    pub fn insert_intent(&self, intent: PaymentIntent) {
        self.intents.lock().unwrap().insert(intent.id.clone(), intent);
    }

    pub fn intent(&self, id: &str) -> Option<PaymentIntent> {
        self.intents.lock().unwrap().get(id).cloned()
    }

    /// Makes `create_price` fail with a missing-product error for this id.
    pub fn mark_product_missing(&self, product_id: &str) {
        self.missing_products
            .lock()
            .unwrap()
            .insert(product_id.to_string());
    }

    pub fn insert_charge(&self, charge: ChargeSnapshot) {
        self.charges.lock().unwrap().insert(charge.id.clone(), charge);
    }

    pub fn insert_transfer(&self, transfer: TransferSnapshot) {
        self.transfers
            .lock()
            .unwrap()
            .insert(transfer.id.clone(), transfer);
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn ensure_customer(&self, email: &str) -> ProcessorResult<String> {
        self.log(format!("ensure_customer:{email}"));
        Ok(format!("cus_{}", self.next()))
    }

    async fn retrieve_account(&self, account_id: &str) -> ProcessorResult<AccountSnapshot> {
        self.log(format!("retrieve_account:{account_id}"));
        let ready = self.account_ready.load(Ordering::SeqCst);
        Ok(AccountSnapshot {
            id: account_id.to_string(),
            charges_enabled: ready,
            payouts_enabled: ready,
            details_submitted: ready,
            pending_requirements: Vec::new(),
        })
    }

    async fn create_product(&self, name: &str) -> ProcessorResult<String> {
        self.log(format!("create_product:{name}"));
        Ok(format!("prod_{}", self.next()))
    }

    async fn create_price(&self, request: CreatePrice) -> ProcessorResult<Price> {
        let interval = match request.interval {
            Some(PriceInterval::Month) => "month",
            Some(PriceInterval::Year) => "year",
            None => "one_time",
        };
        self.log(format!(
            "create_price:product={}:amount={}:interval={}",
            request.product_id, request.amount_minor, interval
        ));
        if self
            .missing_products
            .lock()
            .unwrap()
            .contains(&request.product_id)
        {
            return Err(ProcessorError::missing("product", request.product_id));
        }
        Ok(Price {
            id: format!("price_{}", self.next()),
            active: true,
        })
    }

    async fn set_default_price(&self, product_id: &str, price_id: &str) -> ProcessorResult<()> {
        self.log(format!("set_default_price:{product_id}:{price_id}"));
        Ok(())
    }

    async fn archive_price(&self, price_id: &str) -> ProcessorResult<()> {
        self.log(format!("archive_price:{price_id}"));
        Ok(())
    }

    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntent,
    ) -> ProcessorResult<PaymentIntent> {
        self.log(format!(
            "create_payment_intent:amount={}:fee={}:checkout={}:key={}",
            request.amount_minor,
            request.application_fee_minor,
            request.metadata.checkout,
            request.idempotency_key
        ));
        let n = self.next();
        let intent = PaymentIntent {
            id: format!("pi_{n}"),
            client_secret: Some(format!("cs_{n}")),
            status: IntentStatus::RequiresConfirmation,
            metadata: request.metadata.to_pairs().into_iter().collect(),
        };
        self.insert_intent(intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent> {
        self.log(format!("retrieve_payment_intent:{intent_id}"));
        self.intent(intent_id)
            .ok_or_else(|| ProcessorError::missing("payment_intent", intent_id))
    }

    async fn attach_intent_metadata(
        &self,
        intent_id: &str,
        metadata: PaymentMetadata,
    ) -> ProcessorResult<()> {
        self.log(format!(
            "attach_intent_metadata:{intent_id}:checkout={}",
            metadata.checkout
        ));
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.metadata = metadata.to_pairs().into_iter().collect();
        }
        Ok(())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscription,
    ) -> ProcessorResult<SubscriptionHandle> {
        self.log(format!(
            "create_subscription:price={}:fee_percent={}:key={}",
            request.price_id, request.application_fee_percent, request.idempotency_key
        ));
        let n = self.next();
        Ok(SubscriptionHandle {
            id: format!("sub_{n}"),
            latest_invoice_id: Some(format!("in_{n}")),
            status: "incomplete".to_string(),
        })
    }

    async fn retrieve_invoice_intent(&self, invoice_id: &str) -> ProcessorResult<PaymentIntent> {
        self.log(format!("retrieve_invoice_intent:{invoice_id}"));
        let n = self.next();
        let intent = PaymentIntent {
            id: format!("pi_{n}"),
            client_secret: Some(format!("cs_{n}")),
            status: IntentStatus::RequiresAction,
            metadata: HashMap::new(),
        };
        self.insert_intent(intent.clone());
        Ok(intent)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> ProcessorResult<()> {
        self.log(format!("cancel_subscription:{subscription_id}"));
        Ok(())
    }

    async fn retrieve_charge(
        &self,
        charge_id: &str,
        on_account: Option<&str>,
    ) -> ProcessorResult<ChargeSnapshot> {
        self.log(format!(
            "retrieve_charge:{charge_id}:account={}",
            on_account.unwrap_or("platform")
        ));
        self.charges
            .lock()
            .unwrap()
            .get(charge_id)
            .cloned()
            .ok_or_else(|| ProcessorError::missing("charge", charge_id))
    }

    async fn retrieve_transfer(&self, transfer_id: &str) -> ProcessorResult<TransferSnapshot> {
        self.log(format!("retrieve_transfer:{transfer_id}"));
        self.transfers
            .lock()
            .unwrap()
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| ProcessorError::missing("transfer", transfer_id))
    }

    async fn create_refund(&self, request: CreateRefund) -> ProcessorResult<Refund> {
        self.log(format!(
            "create_refund:charge={}:reverse={}:fee={}",
            request.charge_id, request.reverse_transfer, request.refund_application_fee
        ));
        Ok(Refund {
            id: format!("re_{}", self.next()),
        })
    }
}
