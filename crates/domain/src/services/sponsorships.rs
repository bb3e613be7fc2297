//! Sponsor-initiated subscription cancellation.

use metrics::counter;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::model::{ExplorerId, SponsorshipId, SponsorshipKind, SponsorshipRecord, SponsorshipStatus};
use crate::processor::PaymentProcessor;
use crate::services::events::{publish, EventSender, SponsorshipEvent};
use crate::storage::SponsorshipStore;

/// Cancels an active subscription sponsorship. The processor subscription is
/// canceled first; only then is the local row flipped, so a processor
/// failure leaves the sponsorship intact and retryable.
pub async fn cancel<S, P>(
    storage: &S,
    processor: &P,
    events: &EventSender,
    caller: ExplorerId,
    sponsorship_id: SponsorshipId,
) -> ServiceResult<SponsorshipRecord>
where
    S: SponsorshipStore,
    P: PaymentProcessor + ?Sized,
{
    let sponsorship = storage
        .find_sponsorship(sponsorship_id)
        .await?
        .ok_or(ServiceError::NotFound("sponsorship"))?;
    if sponsorship.sponsor != caller {
        return Err(ServiceError::Forbidden);
    }
    if sponsorship.kind != SponsorshipKind::Subscription {
        return Err(ServiceError::validation(
            "only subscription sponsorships can be canceled",
        ));
    }
    if sponsorship.status != SponsorshipStatus::Active {
        return Err(ServiceError::validation("this sponsorship is not active"));
    }
    let subscription_id = sponsorship.subscription_id.clone().ok_or_else(|| {
        ServiceError::internal("active subscription sponsorship has no subscription id")
    })?;

    processor.cancel_subscription(&subscription_id).await?;

    let canceled = storage
        .cancel_sponsorship(sponsorship_id)
        .await?
        .ok_or_else(|| {
            // Lost a race with another cancellation after the processor call;
            // the subscription is gone either way.
            ServiceError::validation("this sponsorship is no longer active")
        })?;

    publish(
        events,
        SponsorshipEvent::Canceled {
            sponsorship: canceled.clone(),
        },
    );
    counter!("sponsorship_cancellations_total").increment(1);
    info!(sponsorship = %sponsorship_id, subscription = subscription_id, "sponsorship canceled");

    Ok(canceled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::events;
    use crate::services::testutil::{MockProcessor, MockStore};

    #[tokio::test]
    async fn active_subscription_cancels_processor_first() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, mut rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let sponsorship = store.add_active_subscription(sponsor.id, creator.id);

        let canceled = cancel(&store, &processor, &tx, sponsor.id, sponsorship.id)
            .await
            .expect("cancellation succeeds");

        assert_eq!(canceled.status, SponsorshipStatus::Canceled);
        assert_eq!(
            store.sponsorship(sponsorship.id).unwrap().status,
            SponsorshipStatus::Canceled
        );
        assert!(processor
            .calls()
            .iter()
            .any(|c| c == "cancel_subscription:sub_seed"));
        assert!(matches!(
            rx.recv().await,
            Some(SponsorshipEvent::Canceled { .. })
        ));
    }

    #[tokio::test]
    async fn only_the_sponsor_of_record_may_cancel() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let stranger = store.add_explorer("stranger", "s@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let sponsorship = store.add_active_subscription(sponsor.id, creator.id);

        let err = cancel(&store, &processor, &tx, stranger.id, sponsorship.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        assert!(processor.calls().is_empty());
        assert_eq!(
            store.sponsorship(sponsorship.id).unwrap().status,
            SponsorshipStatus::Active
        );
    }

    #[tokio::test]
    async fn canceled_sponsorship_cannot_be_canceled_again() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);
        let creator = store.add_explorer("guide", "g@example.com", true, Some("acct_1"));
        let sponsorship = store.add_active_subscription(sponsor.id, creator.id);

        cancel(&store, &processor, &tx, sponsor.id, sponsorship.id)
            .await
            .unwrap();
        let err = cancel(&store, &processor, &tx, sponsor.id, sponsorship.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        // Exactly one processor cancellation.
        assert_eq!(
            processor
                .calls()
                .iter()
                .filter(|c| c.starts_with("cancel_subscription"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn unknown_sponsorship_is_not_found() {
        let store = MockStore::default();
        let processor = MockProcessor::default();
        let (tx, _rx) = events::channel();
        let sponsor = store.add_explorer("wanderer", "w@example.com", true, None);

        let err = cancel(&store, &processor, &tx, sponsor.id, SponsorshipId(404))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("sponsorship")));
    }
}
