//! Error types for the payment build session engine.
//!
//! Every session operation that can fail returns a [`BuildError`]. Field-level
//! validation problems (a bad amount, an unknown recipient) are *not* errors:
//! they come back as messages and banners inside the build result so the UI
//! gets feedback for every field in one round trip.

use std::fmt;

use thiserror::Error;

use crate::types::BuildPaymentId;

/// A payment field compared by the send-time consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentField {
    /// Sending account.
    From,
    /// Recipient input string.
    To,
    /// Whether the recipient is a literal account address.
    ToIsAccountId,
    /// Native amount being sent.
    Amount,
    /// Asset being sent.
    Asset,
    /// Encrypted secret note.
    SecretNote,
    /// Public on-ledger memo.
    PublicMemo,
}

impl fmt::Display for PaymentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From => write!(f, "from account"),
            Self::To => write!(f, "recipient"),
            Self::ToIsAccountId => write!(f, "recipient type"),
            Self::Amount => write!(f, "amount"),
            Self::Asset => write!(f, "asset"),
            Self::SecretNote => write!(f, "secret note"),
            Self::PublicMemo => write!(f, "public memo"),
        }
    }
}

/// Errors returned by build, review and send operations.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The caller passed mutually exclusive or missing selectors.
    #[error("invalid build payment parameters: {0}")]
    InvalidParameters(String),

    /// Review or send was called without a build payment ID.
    #[error("missing payment ID")]
    MissingPaymentId,

    /// Only the native asset can be sent.
    #[error("sending non-native assets is not supported: {0}")]
    UnsupportedAsset(String),

    /// The build payment ID is unknown or has been stopped.
    #[error("payment build not found: {0}")]
    SessionNotFound(BuildPaymentId),

    /// The session's data lock could not be taken in time.
    #[error("timed out waiting for payment build {0}")]
    LockTimeout(BuildPaymentId),

    /// Review was requested before a build reached full readiness.
    #[error("this payment is not ready to review")]
    NotReadyForReview,

    /// The session claims readiness but holds no frozen snapshot.
    #[error("this payment is missing frozen values")]
    MissingFrozenValues,

    /// Send was requested before review completed.
    #[error("{}", not_ready_to_send_message(.reviewable))]
    NotReadyToSend {
        /// `true` when the payment was ready to review but never reviewed.
        reviewable: bool,
    },

    /// The send request differs from the reviewed snapshot.
    #[error("mismatched {0}")]
    MismatchedField(PaymentField),

    /// The operation's context was cancelled, either by a newer operation
    /// on the same session or by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

fn not_ready_to_send_message(reviewable: &bool) -> &'static str {
    if *reviewable {
        "this payment has not been reviewed"
    } else {
        "this payment is not ready to send"
    }
}

impl BuildError {
    /// Returns `true` for the cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_to_send_distinguishes_review_state() {
        let never = BuildError::NotReadyToSend { reviewable: false };
        let unreviewed = BuildError::NotReadyToSend { reviewable: true };
        assert_eq!(never.to_string(), "this payment is not ready to send");
        assert_eq!(unreviewed.to_string(), "this payment has not been reviewed");
    }

    #[test]
    fn mismatch_names_the_field() {
        let err = BuildError::MismatchedField(PaymentField::SecretNote);
        assert_eq!(err.to_string(), "mismatched secret note");
    }

    #[test]
    fn only_cancelled_is_cancelled() {
        assert!(BuildError::Cancelled.is_cancelled());
        assert!(!BuildError::NotReadyForReview.is_cancelled());
    }
}
