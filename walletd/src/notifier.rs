//! # WebSocket Review Notifier
//!
//! Publishes [`PaymentReviewed`] updates to every `/ws` subscriber. The
//! `enabled` update of a review is held open until a frontend acknowledges
//! it through `wallet_ackPaymentReview`, the ack timeout elapses, or the
//! review is cancelled.
//!
//! ```text
//! review ──► broadcast ──► /ws clients
//!   ▲                          │
//!   └── pending[(bid, seqno)] ◄┘  wallet_ackPaymentReview
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use nova_wallet::{BuildPaymentId, NextButton, NotifyError, PaymentReviewed, ReviewNotifier};

/// Broadcast capacity for review updates. Reviews are user-paced, so a
/// lagging client only ever misses stale spinner updates.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One review waiting for its acknowledgement.
struct Waiter {
    id: u64,
    acked: oneshot::Sender<()>,
}

pub struct WsReviewNotifier {
    events: broadcast::Sender<PaymentReviewed>,
    /// At most one waiter per update. A newer review of the same build
    /// replaces the older waiter, which then fails.
    pending: DashMap<(BuildPaymentId, u32), Waiter>,
    next_waiter: AtomicU64,
    ack_timeout: Duration,
}

impl WsReviewNotifier {
    pub fn new(ack_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events,
            pending: DashMap::new(),
            next_waiter: AtomicU64::new(0),
            ack_timeout,
        }
    }

    /// A new stream of review updates.
    pub fn subscribe(&self) -> broadcast::Receiver<PaymentReviewed> {
        self.events.subscribe()
    }

    /// Acknowledges update `seqno` of `bid`. Returns `false` when nothing
    /// was waiting for it.
    pub fn ack(&self, bid: BuildPaymentId, seqno: u32) -> bool {
        match self.pending.remove(&(bid, seqno)) {
            Some((_, waiter)) => waiter.acked.send(()).is_ok(),
            None => false,
        }
    }

    /// Updates waiting for an acknowledgement.
    pub fn pending_acks(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl ReviewNotifier for WsReviewNotifier {
    async fn payment_reviewed(
        &self,
        ctx: &CancellationToken,
        msg: PaymentReviewed,
    ) -> Result<(), NotifyError> {
        let key = (msg.bid, msg.seqno);
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let acked = if msg.next_button == NextButton::Enabled {
            let (tx, rx) = oneshot::channel();
            if self.pending.insert(key, Waiter { id, acked: tx }).is_some() {
                tracing::debug!(bid = %msg.bid, seqno = msg.seqno, "newer review replaces a waiting one");
            }
            Some(rx)
        } else {
            None
        };
        let release = || {
            self.pending.remove_if(&key, |_, waiter| waiter.id == id);
        };

        if self.events.send(msg).is_err() {
            release();
            return Err(NotifyError::NoSubscribers);
        }
        let Some(acked) = acked else {
            return Ok(());
        };

        let result = tokio::select! {
            res = acked => res.map_err(|_| NotifyError::Failed("superseded by a newer review".to_string())),
            _ = ctx.cancelled() => Err(NotifyError::Cancelled),
            _ = tokio::time::sleep(self.ack_timeout) => Err(NotifyError::Timeout),
        };
        release();
        result
    }
}
