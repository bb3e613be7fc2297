//! Post-commit sponsorship events.
//!
//! The ledger transaction never performs side effects; after it commits, the
//! completion gateway (and the refund and cancellation paths) publish an
//! event here and a background dispatcher fans it out to notifiers. Delivery
//! is best-effort: a full or closed channel is logged and dropped, never
//! surfaced to the payment path.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model::{CheckoutRecord, ExpeditionId, SponsorshipRecord};
use crate::money::FeeBreakdown;

#[derive(Debug, Clone, PartialEq)]
pub enum SponsorshipEvent {
    /// A checkout was finalized into a sponsorship.
    Finalized {
        sponsorship: SponsorshipRecord,
        receipt: FeeBreakdown,
        credited_expedition: Option<ExpeditionId>,
    },
    /// A checkout was refunded back to the sponsor.
    Refunded { checkout: CheckoutRecord },
    /// An active subscription sponsorship was canceled by its sponsor.
    Canceled { sponsorship: SponsorshipRecord },
}

impl SponsorshipEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SponsorshipEvent::Finalized { .. } => "finalized",
            SponsorshipEvent::Refunded { .. } => "refunded",
            SponsorshipEvent::Canceled { .. } => "canceled",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SponsorshipEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SponsorshipEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Sends an event without letting a dead dispatcher fail the caller.
pub fn publish(sender: &EventSender, event: SponsorshipEvent) {
    let kind = event.kind();
    if sender.send(event).is_err() {
        counter!("sponsorship_events_total", "kind" => kind, "status" => "dropped").increment(1);
        warn!(kind, "event dispatcher is gone, dropping sponsorship event");
    } else {
        counter!("sponsorship_events_total", "kind" => kind, "status" => "published").increment(1);
    }
}

/// Sink for dispatched events. Implementations must swallow their own
/// failures; the dispatcher keeps going regardless.
#[async_trait]
pub trait SponsorshipNotifier: Send + Sync {
    async fn notify(&self, event: &SponsorshipEvent);
}

/// Default notifier: structured log lines carrying the receipt breakdown.
pub struct LogNotifier;

#[async_trait]
impl SponsorshipNotifier for LogNotifier {
    async fn notify(&self, event: &SponsorshipEvent) {
        match event {
            SponsorshipEvent::Finalized {
                sponsorship,
                receipt,
                credited_expedition,
            } => {
                info!(
                    sponsorship = %sponsorship.id,
                    creator = %sponsorship.creator,
                    gross_minor = receipt.gross_minor,
                    fee_minor = receipt.fee_minor,
                    net_minor = receipt.net_minor,
                    expedition = credited_expedition.map(|id| id.to_string()),
                    "sponsorship finalized"
                );
            }
            SponsorshipEvent::Refunded { checkout } => {
                info!(
                    checkout = %checkout.id,
                    sponsor = %checkout.sponsor,
                    amount_minor = checkout.amount_minor,
                    "checkout refunded"
                );
            }
            SponsorshipEvent::Canceled { sponsorship } => {
                info!(
                    sponsorship = %sponsorship.id,
                    sponsor = %sponsorship.sponsor,
                    "sponsorship canceled"
                );
            }
        }
    }
}

/// Drains the channel until every sender is dropped. Spawned once at startup.
pub async fn run_dispatcher(
    mut receiver: EventReceiver,
    notifiers: Vec<Arc<dyn SponsorshipNotifier>>,
) {
    while let Some(event) = receiver.recv().await {
        for notifier in &notifiers {
            notifier.notify(&event).await;
        }
    }
    info!("sponsorship event dispatcher stopped");
}
