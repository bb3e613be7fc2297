//! Completion gateway: turns a succeeded payment into ledger state.
//!
//! Two triggers race for every checkout: the processor webhook and the
//! client-driven confirmation poll. Both funnel into the same status-filtered
//! finalization, so whichever arrives second observes no `PENDING` row and
//! reports success without side effects.

use chrono::Utc;
use metrics::counter;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::model::{CheckoutId, CheckoutRecord, ExplorerId, SponsorshipRecord};
use crate::money::FeeSchedule;
use crate::processor::{IntentStatus, PaymentIntent, PaymentMetadata, PaymentProcessor};
use crate::services::events::{publish, EventSender, SponsorshipEvent};
use crate::storage::{CheckoutStore, LedgerStore};

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// This call won the race and produced the sponsorship.
    Finalized(SponsorshipRecord),
    /// The other trigger got there first. Success for the caller.
    AlreadyFinalized,
    /// The intent has not succeeded; nothing to finalize yet.
    NotReady,
}

/// Client-driven confirmation poll. The intent is re-read from the processor
/// rather than trusted from the client, and only its metadata decides which
/// checkout it belongs to. The caller must be the checkout's sponsor.
pub async fn confirm_payment_intent<S, P>(
    storage: &S,
    processor: &P,
    fees: FeeSchedule,
    events: &EventSender,
    caller: ExplorerId,
    intent_id: &str,
) -> ServiceResult<CompletionOutcome>
where
    S: CheckoutStore + LedgerStore,
    P: PaymentProcessor + ?Sized,
{
    let intent = processor.retrieve_payment_intent(intent_id).await?;
    if intent.status != IntentStatus::Succeeded {
        counter!("checkout_completions_total", "trigger" => "poll", "status" => "not_ready")
            .increment(1);
        return Ok(CompletionOutcome::NotReady);
    }

    let checkout = resolve_checkout(storage, &intent).await?;
    if checkout.sponsor != caller {
        counter!("checkout_completions_total", "trigger" => "poll", "status" => "forbidden")
            .increment(1);
        return Err(ServiceError::Forbidden);
    }

    finalize(storage, fees, events, checkout.id, "poll").await
}

/// Webhook-driven completion. The caller has already verified the event
/// signature; the intent payload carries the checkout id in its metadata.
pub async fn complete_from_intent<S>(
    storage: &S,
    fees: FeeSchedule,
    events: &EventSender,
    intent: &PaymentIntent,
) -> ServiceResult<CompletionOutcome>
where
    S: CheckoutStore + LedgerStore,
{
    if intent.status != IntentStatus::Succeeded {
        counter!("checkout_completions_total", "trigger" => "webhook", "status" => "not_ready")
            .increment(1);
        return Ok(CompletionOutcome::NotReady);
    }

    let checkout = resolve_checkout(storage, intent).await?;
    finalize(storage, fees, events, checkout.id, "webhook").await
}

/// Maps an intent back to its checkout via metadata and cross-checks the
/// recorded intent id so stale or spoofed metadata cannot finalize a
/// different payment's row.
async fn resolve_checkout<S>(storage: &S, intent: &PaymentIntent) -> ServiceResult<CheckoutRecord>
where
    S: CheckoutStore,
{
    let metadata = PaymentMetadata::from_map(&intent.metadata).ok_or_else(|| {
        ServiceError::validation("payment intent carries no checkout metadata")
    })?;
    let checkout = storage
        .find_checkout(metadata.checkout)
        .await?
        .ok_or(ServiceError::NotFound("checkout"))?;
    if checkout.payment_intent_id.as_deref() != Some(intent.id.as_str()) {
        return Err(ServiceError::validation(
            "payment intent does not match the checkout's recorded intent",
        ));
    }
    Ok(checkout)
}

async fn finalize<S>(
    storage: &S,
    fees: FeeSchedule,
    events: &EventSender,
    checkout_id: CheckoutId,
    trigger: &'static str,
) -> ServiceResult<CompletionOutcome>
where
    S: LedgerStore,
{
    let Some(outcome) = storage.finalize_checkout(checkout_id, Utc::now()).await? else {
        counter!("checkout_completions_total", "trigger" => trigger, "status" => "already_finalized")
            .increment(1);
        info!(checkout = %checkout_id, trigger, "checkout already finalized");
        return Ok(CompletionOutcome::AlreadyFinalized);
    };

    match outcome.credited_expedition {
        Some(expedition) => {
            counter!("ledger_finalizations_total", "expedition" => "credited").increment(1);
            info!(
                checkout = %checkout_id,
                expedition = %expedition,
                trigger,
                "checkout finalized, expedition credited"
            );
        }
        None => {
            // Sponsorships without a fundable expedition are a normal case,
            // not an error; the aggregate credit is simply skipped.
            counter!("ledger_finalizations_total", "expedition" => "none").increment(1);
            info!(checkout = %checkout_id, trigger, "checkout finalized without expedition credit");
        }
    }

    let receipt = fees.breakdown(outcome.sponsorship.amount_minor);
    publish(
        events,
        SponsorshipEvent::Finalized {
            sponsorship: outcome.sponsorship.clone(),
            receipt,
            credited_expedition: outcome.credited_expedition,
        },
    );

    counter!("checkout_completions_total", "trigger" => trigger, "status" => "finalized")
        .increment(1);
    Ok(CompletionOutcome::Finalized(outcome.sponsorship))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CheckoutStatus, ExpeditionStatus, NewCheckout, SponsorshipKind, SponsorshipStatus,
    };
    use crate::services::events;
    use crate::services::testutil::{MockProcessor, MockStore};
    use std::collections::HashMap;

    fn pending_checkout(
        store: &MockStore,
        sponsor: ExplorerId,
        creator: ExplorerId,
        amount_minor: i64,
        expedition: Option<crate::model::ExpeditionId>,
    ) -> CheckoutRecord {
        store.add_pending_checkout(NewCheckout {
            kind: SponsorshipKind::OneTime,
            tier: None,
            amount_minor,
            currency: "usd".to_string(),
            message: Some("bon voyage".to_string()),
            sponsor,
            creator,
            email_delivery: true,
            is_public: true,
            is_message_public: true,
            expedition,
        })
    }

    fn succeeded_intent(
        id: &str,
        checkout: CheckoutId,
        sponsor: ExplorerId,
        creator: ExplorerId,
    ) -> PaymentIntent {
        PaymentIntent {
            id: id.to_string(),
            client_secret: None,
            status: IntentStatus::Succeeded,
            metadata: PaymentMetadata {
                checkout,
                sponsor,
                creator,
            }
            .to_pairs()
            .into_iter()
            .collect(),
        }
    }

    #[tokio::test]
    async fn poll_finalizes_and_credits_the_expedition() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, mut rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let expedition =
            store.add_expedition(creator.id, "Patagonia traverse", ExpeditionStatus::Active);
        let checkout = pending_checkout(&store, sponsor.id, creator.id, 2_500, Some(expedition.id));

        store
            .set_payment_handles(checkout.id, Some("pi_1"), None)
            .await
            .unwrap();
        processor.insert_intent(succeeded_intent("pi_1", checkout.id, sponsor.id, creator.id));

        let outcome = confirm_payment_intent(
            &store,
            &processor,
            FeeSchedule::new(10.0),
            &tx,
            sponsor.id,
            "pi_1",
        )
        .await
        .expect("confirmation succeeds");

        let sponsorship = match outcome {
            CompletionOutcome::Finalized(s) => s,
            other => panic!("expected finalized, got {other:?}"),
        };
        assert_eq!(sponsorship.status, SponsorshipStatus::Confirmed);
        assert_eq!(sponsorship.amount_minor, 2_500);

        let row = store.checkout(checkout.id).unwrap();
        assert_eq!(row.status, CheckoutStatus::Confirmed);
        assert!(row.confirmed_at.is_some());

        // Major-unit aggregate: 2500 minor credits 25.
        let credited = store.expedition(expedition.id).unwrap();
        assert_eq!(credited.raised, 25);
        assert_eq!(credited.sponsors_count, 1);

        match rx.recv().await {
            Some(SponsorshipEvent::Finalized {
                receipt,
                credited_expedition,
                ..
            }) => {
                assert_eq!(receipt.fee_minor, 250);
                assert_eq!(receipt.net_minor, 2_250);
                assert_eq!(credited_expedition, Some(expedition.id));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_trigger_is_a_no_op_success() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, mut rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let expedition = store.add_expedition(creator.id, "Atlas ridge", ExpeditionStatus::Active);
        let checkout = pending_checkout(&store, sponsor.id, creator.id, 1_000, Some(expedition.id));
        store
            .set_payment_handles(checkout.id, Some("pi_1"), None)
            .await
            .unwrap();

        // Webhook lands first.
        let intent = succeeded_intent("pi_1", checkout.id, sponsor.id, creator.id);
        let first = complete_from_intent(&store, FeeSchedule::default(), &tx, &intent)
            .await
            .unwrap();
        assert!(matches!(first, CompletionOutcome::Finalized(_)));

        // The poll arrives second and must not double-credit.
        processor.insert_intent(intent);
        let second = confirm_payment_intent(
            &store,
            &processor,
            FeeSchedule::default(),
            &tx,
            sponsor.id,
            "pi_1",
        )
        .await
        .unwrap();
        assert_eq!(second, CompletionOutcome::AlreadyFinalized);

        assert_eq!(store.sponsorships().len(), 1);
        let credited = store.expedition(expedition.id).unwrap();
        assert_eq!(credited.raised, 10);
        assert_eq!(credited.sponsors_count, 1);

        // Exactly one finalized event.
        assert!(matches!(
            rx.recv().await,
            Some(SponsorshipEvent::Finalized { .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn poll_rejects_a_foreign_caller() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let stranger = store.add_explorer("stranger", "s@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let checkout = pending_checkout(&store, sponsor.id, creator.id, 1_000, None);
        store
            .set_payment_handles(checkout.id, Some("pi_1"), None)
            .await
            .unwrap();
        processor.insert_intent(succeeded_intent("pi_1", checkout.id, sponsor.id, creator.id));

        let err = confirm_payment_intent(
            &store,
            &processor,
            FeeSchedule::default(),
            &tx,
            stranger.id,
            "pi_1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        assert_eq!(
            store.checkout(checkout.id).unwrap().status,
            CheckoutStatus::Pending
        );
    }

    #[tokio::test]
    async fn unsucceeded_intent_leaves_the_checkout_pending() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let checkout = pending_checkout(&store, sponsor.id, creator.id, 1_000, None);
        store
            .set_payment_handles(checkout.id, Some("pi_1"), None)
            .await
            .unwrap();
        processor.insert_intent(PaymentIntent {
            id: "pi_1".to_string(),
            client_secret: None,
            status: IntentStatus::Processing,
            metadata: HashMap::new(),
        });

        let outcome = confirm_payment_intent(
            &store,
            &processor,
            FeeSchedule::default(),
            &tx,
            sponsor.id,
            "pi_1",
        )
        .await
        .unwrap();
        assert_eq!(outcome, CompletionOutcome::NotReady);
        assert_eq!(
            store.checkout(checkout.id).unwrap().status,
            CheckoutStatus::Pending
        );
        assert!(store.sponsorships().is_empty());
    }

    #[tokio::test]
    async fn webhook_without_metadata_is_rejected() {
        let store = MockStore::default();
        let (tx, _rx) = events::channel();
        let intent = PaymentIntent {
            id: "pi_1".to_string(),
            client_secret: None,
            status: IntentStatus::Succeeded,
            metadata: HashMap::new(),
        };
        let err = complete_from_intent(&store, FeeSchedule::default(), &tx, &intent)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn webhook_rejects_an_intent_id_mismatch() {
        let store = MockStore::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let checkout = pending_checkout(&store, sponsor.id, creator.id, 1_000, None);
        store
            .set_payment_handles(checkout.id, Some("pi_real"), None)
            .await
            .unwrap();

        let intent = succeeded_intent("pi_spoofed", checkout.id, sponsor.id, creator.id);
        let err = complete_from_intent(&store, FeeSchedule::default(), &tx, &intent)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(
            store.checkout(checkout.id).unwrap().status,
            CheckoutStatus::Pending
        );
    }

    #[tokio::test]
    async fn finalization_without_expedition_skips_the_credit() {
        let store = MockStore::default();
        let (tx, mut rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let checkout = pending_checkout(&store, sponsor.id, creator.id, 1_000, None);
        store
            .set_payment_handles(checkout.id, Some("pi_1"), None)
            .await
            .unwrap();

        let intent = succeeded_intent("pi_1", checkout.id, sponsor.id, creator.id);
        let outcome = complete_from_intent(&store, FeeSchedule::default(), &tx, &intent)
            .await
            .unwrap();
        assert!(matches!(outcome, CompletionOutcome::Finalized(_)));
        match rx.recv().await {
            Some(SponsorshipEvent::Finalized {
                credited_expedition,
                ..
            }) => {
                assert_eq!(credited_expedition, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn completed_expedition_receives_no_credit() {
        let store = MockStore::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let expedition =
            store.add_expedition(creator.id, "Done and dusted", ExpeditionStatus::Completed);
        let checkout = pending_checkout(&store, sponsor.id, creator.id, 1_000, Some(expedition.id));
        store
            .set_payment_handles(checkout.id, Some("pi_1"), None)
            .await
            .unwrap();

        let intent = succeeded_intent("pi_1", checkout.id, sponsor.id, creator.id);
        complete_from_intent(&store, FeeSchedule::default(), &tx, &intent)
            .await
            .unwrap();

        let untouched = store.expedition(expedition.id).unwrap();
        assert_eq!(untouched.raised, 0);
        assert_eq!(untouched.sponsors_count, 0);
    }

    #[tokio::test]
    async fn subscription_finalization_activates_with_expiry() {
        let store = MockStore::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let checkout = store.add_pending_checkout(NewCheckout {
            kind: SponsorshipKind::Subscription,
            tier: None,
            amount_minor: 1_000,
            currency: "usd".to_string(),
            message: None,
            sponsor: sponsor.id,
            creator: creator.id,
            email_delivery: true,
            is_public: true,
            is_message_public: true,
            expedition: None,
        });
        store
            .set_payment_handles(checkout.id, Some("pi_1"), Some("sub_1"))
            .await
            .unwrap();

        let intent = succeeded_intent("pi_1", checkout.id, sponsor.id, creator.id);
        let outcome = complete_from_intent(&store, FeeSchedule::default(), &tx, &intent)
            .await
            .unwrap();
        let sponsorship = match outcome {
            CompletionOutcome::Finalized(s) => s,
            other => panic!("expected finalized, got {other:?}"),
        };
        assert_eq!(sponsorship.status, SponsorshipStatus::Active);
        assert_eq!(sponsorship.subscription_id.as_deref(), Some("sub_1"));
        assert!(sponsorship.expires_at.is_some());
    }
}
