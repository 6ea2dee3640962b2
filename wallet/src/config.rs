//! # Payment Build Configuration & Constants
//!
//! Every limit the payment builder enforces lives here. The numbers are
//! ledger rules as much as UX rules: the minimum floors mirror the ledger's
//! account-creation reserve, the base fee mirrors the cost of a single
//! operation transaction. Change them together with the ledger, not alone.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Native Asset
// ---------------------------------------------------------------------------

/// Ticker of the ledger's native asset.
pub const NATIVE_ASSET_CODE: &str = "NOVA";

/// Decimal places of the native asset. The smallest unit is the photon.
pub const NATIVE_DECIMALS: u32 = 7;

/// Photons per whole native unit (10^7).
pub const PHOTONS_PER_UNIT: i64 = 10_000_000;

/// Fee of a single-operation transaction, in photons.
///
/// Subtracted from the available balance before comparing it against the
/// requested amount, so the user is never told they can send a balance
/// they cannot actually pay the fee for.
pub const BASE_FEE_PHOTONS: i64 = 100;

/// Human-readable prefix of ledger account addresses (`nova1…`).
pub const ACCOUNT_HRP: &str = "nova";

// ---------------------------------------------------------------------------
// Recipient Floors
// ---------------------------------------------------------------------------

/// Minimum amount for a relay payment: the recipient has no account yet,
/// so the payment must cover account creation plus the relay fees.
pub const RELAY_MIN_AMOUNT: &str = "2.01";

/// Minimum amount for the first payment into an existing but unfunded
/// account.
pub const UNFUNDED_MIN_AMOUNT: &str = "1";

// ---------------------------------------------------------------------------
// Field Limits
// ---------------------------------------------------------------------------

/// Maximum length of the encrypted secret note, in bytes.
pub const MAX_SECRET_NOTE_BYTES: usize = 500;

/// Maximum length of the public on-ledger memo, in bytes.
pub const MAX_PUBLIC_MEMO_BYTES: usize = 28;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// How long an operation waits for a session's data lock before giving up.
pub const DATA_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Attribution line appended to exchange-rate explanations.
pub const RATE_SOURCE: &str = "Source: NOVA rate oracle";

// ---------------------------------------------------------------------------
// BuildConfig
// ---------------------------------------------------------------------------

/// Tunable parameters for a [`PaymentBuildService`](crate::PaymentBuildService).
///
/// The defaults are the ledger rules above. Tests shrink `data_lock_timeout`
/// to keep contention cases fast.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Upper bound on waiting for a session's data lock.
    pub data_lock_timeout: Duration,

    /// Secret note cap, in bytes.
    pub max_secret_note_bytes: usize,

    /// Public memo cap, in bytes.
    pub max_public_memo_bytes: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            data_lock_timeout: DATA_LOCK_TIMEOUT,
            max_secret_note_bytes: MAX_SECRET_NOTE_BYTES,
            max_public_memo_bytes: MAX_PUBLIC_MEMO_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = BuildConfig::default();
        assert_eq!(config.data_lock_timeout, Duration::from_secs(5));
        assert_eq!(config.max_secret_note_bytes, 500);
        assert_eq!(config.max_public_memo_bytes, 28);
    }

    #[test]
    fn photons_per_unit_matches_decimals() {
        assert_eq!(PHOTONS_PER_UNIT, 10i64.pow(NATIVE_DECIMALS));
    }
}
