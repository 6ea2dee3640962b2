//! # Review Stage
//!
//! Moves a frozen payment from reviewable to sendable while keeping the UI
//! in step through numbered notifications:
//!
//! ```text
//! seqno 1  spinning   (fire and forget)
//!          recipient verification
//!          ready_to_send = true
//! seqno 2  enabled    (wait for the UI's acknowledgement or cancellation)
//! ```
//!
//! A session that is not reviewable gets a single `disabled` notification
//! with an error banner.
//!
//! Each notification runs in its own task. A notifier error is logged and
//! never fails the review; the task signals completion through a oneshot,
//! which the final step waits on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BuildError;
use crate::registry::SessionLease;
use crate::types::{BuildPaymentId, NextButton, SendBanner, SessionId};

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// A review progress update for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReviewed {
    /// UI sub-session the review belongs to.
    pub session_id: SessionId,
    /// Build under review.
    pub bid: BuildPaymentId,
    /// Position in the review's notification sequence, starting at 1.
    pub seqno: u32,
    /// Banners to show.
    pub banners: Vec<SendBanner>,
    /// Send button state.
    pub next_button: NextButton,
}

/// Errors a [`ReviewNotifier`] can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// Nobody is listening for review updates.
    #[error("no review listeners")]
    NoSubscribers,

    /// The UI did not acknowledge in time.
    #[error("review acknowledgement timed out")]
    Timeout,

    /// The notification's context was cancelled.
    #[error("review notification cancelled")]
    Cancelled,

    /// Delivery failed.
    #[error("review notification failed: {0}")]
    Failed(String),
}

/// Delivers review updates to the UI.
///
/// `payment_reviewed` returns once the UI has taken the update; for the
/// final update of a review that return is the acknowledgement.
#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    async fn payment_reviewed(
        &self,
        ctx: &CancellationToken,
        msg: PaymentReviewed,
    ) -> Result<(), NotifyError>;
}

/// Emits `msg` from a new task. The returned receiver completes when the
/// notifier call has returned, whatever its outcome.
fn notify(
    notifier: &Arc<dyn ReviewNotifier>,
    ctx: &CancellationToken,
    msg: PaymentReviewed,
) -> oneshot::Receiver<()> {
    let (done, received) = oneshot::channel();
    debug!(
        bid = %msg.bid,
        session_id = msg.session_id,
        seqno = msg.seqno,
        next_button = %msg.next_button,
        banners = msg.banners.len(),
        "sending payment review update"
    );

    let notifier = Arc::clone(notifier);
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let (bid, seqno) = (msg.bid, msg.seqno);
        if let Err(e) = notifier.payment_reviewed(&ctx, msg).await {
            debug!(%bid, seqno, error = %e, "payment review update failed");
        }
        let _ = done.send(());
    });
    received
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// Reviews the payment frozen in `lease`.
///
/// Returns after the UI acknowledged the `enabled` update, or with
/// [`BuildError::Cancelled`] when the operation was cancelled first.
pub async fn review_payment(
    lease: &mut SessionLease,
    notifier: &Arc<dyn ReviewNotifier>,
) -> Result<(), BuildError> {
    let ctx = lease.ctx().clone();
    let bid = lease.id();
    let session_id = ctx.session_id();
    let update = move |seqno, banners, next_button| PaymentReviewed {
        session_id,
        bid,
        seqno,
        banners,
        next_button,
    };

    if !lease.data().ready_to_review() {
        let msg = update(
            1,
            vec![SendBanner::error("This payment is not ready to review")],
            NextButton::Disabled,
        );
        notify(notifier, ctx.token(), msg);
        return Err(BuildError::NotReadyForReview);
    }
    let Some(frozen) = lease.data().frozen().cloned() else {
        return Err(BuildError::MissingFrozenValues);
    };

    notify(notifier, ctx.token(), update(1, Vec::new(), NextButton::Spinning));

    // Recipient identity is verified outside this crate. A literal address
    // has no identity to verify.
    if frozen.to_is_account_id {
        debug!(%bid, to = %frozen.to, "skipping identify for account address recipient");
    } else {
        debug!(%bid, to = %frozen.to, "skipping identify of recipient");
    }

    lease.data_mut().mark_reviewed();

    ctx.err()?;
    let acked = notify(notifier, ctx.token(), update(2, Vec::new(), NextButton::Enabled));

    // Stay open until the UI acks the enabled button or the call is cancelled.
    tokio::select! {
        _ = acked => {}
        _ = ctx.cancelled() => {}
    }
    ctx.err()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
