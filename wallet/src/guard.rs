//! Send-time consistency guard.
//!
//! Review happens against one snapshot, but the send call can arrive after
//! the form was edited again. The guard accepts a send only when every
//! field matches the reviewed snapshot exactly.

use std::sync::Arc;

use tracing::debug;

use crate::error::{BuildError, PaymentField};
use crate::session::{FrozenPayment, SendPaymentArgs, SessionData};

impl SessionData {
    /// Checks that this session has a reviewed payment equal to `args`.
    ///
    /// Reads only. Returns the reviewed snapshot on success.
    pub fn check_ready_to_send(
        &self,
        args: &SendPaymentArgs,
    ) -> Result<Arc<FrozenPayment>, BuildError> {
        if !self.ready_to_send() {
            return Err(BuildError::NotReadyToSend {
                reviewable: self.ready_to_review(),
            });
        }
        let frozen = self.frozen().ok_or(BuildError::MissingFrozenValues)?;

        if let Some(field) = first_mismatch(args, frozen) {
            // Field name only; values may include the secret note.
            debug!(bid = %args.bid, %field, "send does not match reviewed payment");
            return Err(BuildError::MismatchedField(field));
        }
        Ok(Arc::clone(frozen))
    }
}

fn first_mismatch(args: &SendPaymentArgs, frozen: &FrozenPayment) -> Option<PaymentField> {
    if args.from != frozen.from {
        return Some(PaymentField::From);
    }
    if args.to != frozen.to {
        return Some(PaymentField::To);
    }
    if args.to_is_account_id != frozen.to_is_account_id {
        return Some(PaymentField::ToIsAccountId);
    }
    // The amount actually sent, not its display worth.
    if args.amount != frozen.amount {
        return Some(PaymentField::Amount);
    }
    if args.asset != frozen.asset {
        return Some(PaymentField::Asset);
    }
    if args.secret_note != frozen.secret_note {
        return Some(PaymentField::SecretNote);
    }
    if args.public_memo != frozen.public_memo {
        return Some(PaymentField::PublicMemo);
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::account::AccountId;
    use crate::types::{Asset, BuildPaymentId};

    fn frozen() -> FrozenPayment {
        FrozenPayment {
            from: AccountId::from_seed("me"),
            to: "alice".into(),
            to_is_account_id: false,
            amount: "12.5".into(),
            asset: Asset::Native,
            secret_note: "the eagle has landed".into(),
            public_memo: "rent".into(),
            frozen_at: Utc::now(),
        }
    }

    fn reviewed() -> (SessionData, SendPaymentArgs) {
        let mut data = SessionData::default();
        let payment = data.freeze(frozen());
        data.mark_reviewed();
        let args = SendPaymentArgs::from_frozen(BuildPaymentId::new(), 1, &payment);
        (data, args)
    }

    // -- readiness -------------------------------------------------------------

    #[test]
    fn never_built_is_not_ready() {
        let data = SessionData::default();
        let (_, args) = reviewed();
        let err = data.check_ready_to_send(&args).unwrap_err();
        assert!(matches!(err, BuildError::NotReadyToSend { reviewable: false }));
        assert_eq!(err.to_string(), "this payment is not ready to send");
    }

    #[test]
    fn built_but_unreviewed() {
        let mut data = SessionData::default();
        data.freeze(frozen());
        let (_, args) = reviewed();
        let err = data.check_ready_to_send(&args).unwrap_err();
        assert!(matches!(err, BuildError::NotReadyToSend { reviewable: true }));
        assert_eq!(err.to_string(), "this payment has not been reviewed");
    }

    // -- matching --------------------------------------------------------------

    #[test]
    fn exact_copy_passes() {
        let (data, args) = reviewed();
        let approved = data.check_ready_to_send(&args).unwrap();
        assert!(approved.same_payment(&frozen()));
    }

    #[test]
    fn every_field_is_checked() {
        let (data, base) = reviewed();
        let cases: Vec<(PaymentField, Box<dyn Fn(&mut SendPaymentArgs)>)> = vec![
            (PaymentField::From, Box::new(|a| a.from = AccountId::from_seed("other"))),
            (PaymentField::To, Box::new(|a| a.to = "bob".into())),
            (PaymentField::ToIsAccountId, Box::new(|a| a.to_is_account_id = true)),
            (PaymentField::Amount, Box::new(|a| a.amount = "12.50".into())),
            (
                PaymentField::Asset,
                Box::new(|a| {
                    a.asset = Asset::Credit {
                        code: "USDC".into(),
                        issuer: AccountId::from_seed("issuer"),
                    }
                }),
            ),
            (PaymentField::SecretNote, Box::new(|a| a.secret_note.push('!'))),
            (PaymentField::PublicMemo, Box::new(|a| a.public_memo.clear())),
        ];

        for (field, mutate) in cases {
            let mut args = base.clone();
            mutate(&mut args);
            match data.check_ready_to_send(&args) {
                Err(BuildError::MismatchedField(got)) => assert_eq!(got, field),
                other => panic!("expected mismatch on {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn secret_note_never_in_error() {
        let (data, mut args) = reviewed();
        args.secret_note = "a different secret".into();
        let err = data.check_ready_to_send(&args).unwrap_err();
        let rendered = err.to_string();
        assert_eq!(rendered, "mismatched secret note");
        assert!(!rendered.contains("eagle"));
    }

    #[test]
    fn guard_does_not_mutate() {
        let (data, mut args) = reviewed();
        args.amount = "1".into();
        let _ = data.check_ready_to_send(&args);
        assert!(data.ready_to_send());
        assert!(data.frozen().is_some());
    }
}
