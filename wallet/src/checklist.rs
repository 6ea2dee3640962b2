//! Per-call readiness checklist.
//!
//! Built fresh on the stack by every build call and dropped with it, so a
//! flag from an earlier input can never leak into a later decision.

/// What a build is preparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    /// A payment from one of the user's accounts.
    Payment,
    /// A payment request to be paid by someone else.
    Request,
}

/// One flag per independently validated field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessChecklist {
    pub from: bool,
    pub to: bool,
    pub amount: bool,
    pub secret_note: bool,
    pub public_memo: bool,
}

impl ReadinessChecklist {
    /// Whether every flag `kind` requires is set.
    pub fn is_ready(&self, kind: BuildKind) -> bool {
        self.missing(kind).is_empty()
    }

    /// Names of the required flags that are not set.
    pub fn missing(&self, kind: BuildKind) -> Vec<&'static str> {
        let required: &[(&'static str, bool)] = match kind {
            BuildKind::Payment => &[
                ("from", self.from),
                ("to", self.to),
                ("amount", self.amount),
                ("secret_note", self.secret_note),
                ("public_memo", self.public_memo),
            ],
            BuildKind::Request => &[
                ("to", self.to),
                ("amount", self.amount),
                ("secret_note", self.secret_note),
            ],
        };
        required
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_set() -> ReadinessChecklist {
        ReadinessChecklist {
            from: true,
            to: true,
            amount: true,
            secret_note: true,
            public_memo: true,
        }
    }

    #[test]
    fn empty_checklist_is_not_ready() {
        let checklist = ReadinessChecklist::default();
        assert!(!checklist.is_ready(BuildKind::Payment));
        assert!(!checklist.is_ready(BuildKind::Request));
        assert_eq!(checklist.missing(BuildKind::Request), ["to", "amount", "secret_note"]);
    }

    #[test]
    fn payment_needs_every_flag() {
        assert!(all_set().is_ready(BuildKind::Payment));

        let mut checklist = all_set();
        checklist.public_memo = false;
        assert!(!checklist.is_ready(BuildKind::Payment));
        assert_eq!(checklist.missing(BuildKind::Payment), ["public_memo"]);
    }

    #[test]
    fn request_ignores_sender_and_memo() {
        let checklist = ReadinessChecklist {
            from: false,
            public_memo: false,
            ..all_set()
        };
        assert!(checklist.is_ready(BuildKind::Request));
        assert!(!checklist.is_ready(BuildKind::Payment));
    }
}
