//! Per-build session state: readiness flags and the frozen snapshot.
//!
//! `ready_to_send ⇒ ready_to_review ⇒ frozen.is_some()` holds after every
//! method on [`SessionData`]. The only way to become reviewable is
//! [`SessionData::freeze`], and the only way to become sendable is
//! [`SessionData::mark_reviewed`] on a reviewable session.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::types::{Asset, BuildPaymentId, SessionId};

// ---------------------------------------------------------------------------
// FrozenPayment
// ---------------------------------------------------------------------------

/// Immutable snapshot of a payment taken the moment a build became ready.
///
/// Review and send only ever trust this snapshot. A later build replaces the
/// `Arc`, it never edits the value behind it.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct FrozenPayment {
    /// Sending account.
    pub from: AccountId,
    /// Recipient input exactly as entered.
    pub to: String,
    /// Whether `to` is a literal account address.
    pub to_is_account_id: bool,
    /// Native amount being sent.
    pub amount: String,
    /// Asset being sent.
    pub asset: Asset,
    /// Encrypted note for the recipient.
    pub secret_note: String,
    /// Public on-ledger memo.
    pub public_memo: String,
    /// When the snapshot was taken.
    pub frozen_at: DateTime<Utc>,
}

impl FrozenPayment {
    /// Returns `true` if both snapshots describe the same payment,
    /// ignoring when they were taken.
    pub fn same_payment(&self, other: &FrozenPayment) -> bool {
        self.from == other.from
            && self.to == other.to
            && self.to_is_account_id == other.to_is_account_id
            && self.amount == other.amount
            && self.asset == other.asset
            && self.secret_note == other.secret_note
            && self.public_memo == other.public_memo
    }
}

// The secret note stays out of logs.
impl fmt::Debug for FrozenPayment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenPayment")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("to_is_account_id", &self.to_is_account_id)
            .field("amount", &self.amount)
            .field("asset", &self.asset)
            .field("secret_note", &format_args!("<{} bytes>", self.secret_note.len()))
            .field("public_memo", &self.public_memo)
            .field("frozen_at", &self.frozen_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionData
// ---------------------------------------------------------------------------

/// Mutable state of one payment build, guarded by the entry's data lock.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    ready_to_review: bool,
    ready_to_send: bool,
    frozen: Option<Arc<FrozenPayment>>,
}

impl SessionData {
    /// Whether the last build passed every check.
    pub fn ready_to_review(&self) -> bool {
        self.ready_to_review
    }

    /// Whether the frozen payment has been reviewed.
    pub fn ready_to_send(&self) -> bool {
        self.ready_to_send
    }

    /// The current snapshot, if any.
    pub fn frozen(&self) -> Option<&Arc<FrozenPayment>> {
        self.frozen.as_ref()
    }

    /// Drops readiness and the snapshot.
    pub fn reset(&mut self) {
        self.ready_to_review = false;
        self.ready_to_send = false;
        self.frozen = None;
    }

    /// Installs a new snapshot and marks the session reviewable.
    pub fn freeze(&mut self, payment: FrozenPayment) -> Arc<FrozenPayment> {
        let payment = Arc::new(payment);
        self.ready_to_review = true;
        self.ready_to_send = false;
        self.frozen = Some(Arc::clone(&payment));
        payment
    }

    /// Marks a reviewable session sendable. Returns `false` and changes
    /// nothing if the session is not reviewable.
    pub fn mark_reviewed(&mut self) -> bool {
        if !self.ready_to_review || self.frozen.is_none() {
            return false;
        }
        self.ready_to_send = true;
        true
    }

    /// Checks the readiness invariant.
    pub fn is_consistent(&self) -> bool {
        (!self.ready_to_send || self.ready_to_review)
            && (self.ready_to_review == self.frozen.is_some())
    }
}

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

/// A request to send a reviewed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPaymentArgs {
    /// Build the payment was reviewed under.
    pub bid: BuildPaymentId,
    /// UI sub-session issuing the send. Required: a lower id than the
    /// build's is stale and gets a cancelled slot.
    pub session_id: SessionId,
    /// Sending account.
    pub from: AccountId,
    /// Recipient input.
    pub to: String,
    /// Whether `to` is a literal account address.
    #[serde(default)]
    pub to_is_account_id: bool,
    /// Native amount.
    pub amount: String,
    /// Asset.
    #[serde(default)]
    pub asset: Asset,
    /// Encrypted note.
    #[serde(default)]
    pub secret_note: String,
    /// Public memo.
    #[serde(default)]
    pub public_memo: String,
}

impl SendPaymentArgs {
    /// A send request that copies every field of a snapshot.
    pub fn from_frozen(bid: BuildPaymentId, session_id: SessionId, frozen: &FrozenPayment) -> Self {
        Self {
            bid,
            session_id,
            from: frozen.from,
            to: frozen.to.clone(),
            to_is_account_id: frozen.to_is_account_id,
            amount: frozen.amount.clone(),
            asset: frozen.asset.clone(),
            secret_note: frozen.secret_note.clone(),
            public_memo: frozen.public_memo.clone(),
        }
    }
}

/// A payment cleared for submission.
#[derive(Debug, Clone)]
pub struct ApprovedPayment {
    /// Build the payment was reviewed under.
    pub bid: BuildPaymentId,
    /// The reviewed snapshot.
    pub payment: Arc<FrozenPayment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payment() -> FrozenPayment {
        FrozenPayment {
            from: AccountId::from_seed("me"),
            to: "alice".into(),
            to_is_account_id: false,
            amount: "5".into(),
            asset: Asset::Native,
            secret_note: "for lunch".into(),
            public_memo: "lunch".into(),
            frozen_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_session_is_consistent() {
        let data = SessionData::default();
        assert!(data.is_consistent());
        assert!(!data.ready_to_review());
        assert!(data.frozen().is_none());
    }

    #[test]
    fn freeze_then_review() {
        let mut data = SessionData::default();
        data.freeze(sample_payment());
        assert!(data.ready_to_review());
        assert!(!data.ready_to_send());
        assert!(data.is_consistent());

        assert!(data.mark_reviewed());
        assert!(data.ready_to_send());
        assert!(data.is_consistent());

        data.reset();
        assert!(!data.ready_to_review() && !data.ready_to_send());
        assert!(data.is_consistent());
    }

    #[test]
    fn cannot_review_unfrozen_session() {
        let mut data = SessionData::default();
        assert!(!data.mark_reviewed());
        assert!(!data.ready_to_send());
    }

    #[test]
    fn refreeze_replaces_snapshot_and_clears_send() {
        let mut data = SessionData::default();
        let first = data.freeze(sample_payment());
        data.mark_reviewed();

        let second = data.freeze(sample_payment());
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.same_payment(&second));
        assert!(!data.ready_to_send());
    }

    #[test]
    fn debug_hides_secret_note() {
        let rendered = format!("{:?}", sample_payment());
        assert!(!rendered.contains("for lunch"));
        assert!(rendered.contains("<9 bytes>"));
    }
}
