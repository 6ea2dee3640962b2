//! # Ledger Account Identifiers
//!
//! An account ID is the literal ledger address a payment can be sent to.
//! It is a 32-byte account key encoded as Bech32 under the `nova` prefix:
//!
//! ```text
//! account key (32 bytes)
//!     -> Bech32("nova", key) -> nova1qw508d6qe...
//! ```
//!
//! Bech32's checksum catches the copy-paste typos that matter most in a
//! payment form, so a recipient typed as an address is validated locally
//! before any lookup is attempted.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ACCOUNT_HRP;

/// Length of the account key carried in an address.
const ACCOUNT_KEY_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while parsing an account address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountIdError {
    /// The string is not valid Bech32 (bad charset, checksum, or length).
    #[error("invalid account address: {0}")]
    Bech32Decode(String),

    /// The address belongs to a different network or address family.
    #[error("invalid account address prefix: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected prefix.
        expected: String,
        /// The prefix that was found.
        got: String,
    },

    /// The decoded key has the wrong size.
    #[error("invalid account key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A ledger account, identified by its 32-byte key.
///
/// # Examples
///
/// ```
/// use nova_wallet::AccountId;
///
/// let id = AccountId::from_seed("alice");
/// let address = id.to_address();
/// assert!(address.starts_with("nova1"));
/// assert_eq!(AccountId::parse(&address).unwrap(), id);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId {
    key: [u8; ACCOUNT_KEY_LENGTH],
}

impl AccountId {
    /// Wraps a raw account key.
    pub fn from_key(key: [u8; ACCOUNT_KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Derives a deterministic account from a seed string via BLAKE3.
    ///
    /// Used for fixtures and tests; real accounts come from the key store.
    pub fn from_seed(seed: &str) -> Self {
        Self {
            key: *blake3::hash(seed.as_bytes()).as_bytes(),
        }
    }

    /// Parses and validates a Bech32 account address.
    pub fn parse(addr: &str) -> Result<Self, AccountIdError> {
        let (hrp, data) =
            bech32::decode(addr).map_err(|e| AccountIdError::Bech32Decode(e.to_string()))?;

        let expected_hrp = Hrp::parse(ACCOUNT_HRP).expect("static HRP is valid");
        if hrp != expected_hrp {
            return Err(AccountIdError::InvalidHrp {
                expected: ACCOUNT_HRP.to_string(),
                got: hrp.to_string(),
            });
        }

        if data.len() != ACCOUNT_KEY_LENGTH {
            return Err(AccountIdError::InvalidKeyLength {
                expected: ACCOUNT_KEY_LENGTH,
                got: data.len(),
            });
        }

        let mut key = [0u8; ACCOUNT_KEY_LENGTH];
        key.copy_from_slice(&data);
        Ok(Self { key })
    }

    /// Encodes this account as its Bech32 address.
    pub fn to_address(&self) -> String {
        let hrp = Hrp::parse(ACCOUNT_HRP).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.key)
            .expect("encoding a 32-byte payload should never fail")
    }

    /// The raw account key.
    pub fn key(&self) -> &[u8; ACCOUNT_KEY_LENGTH] {
        &self.key
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_address())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_address())
    }
}

impl Serialize for AccountId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_address())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrip() {
        let id = AccountId::from_seed("alice");
        let addr = id.to_address();
        assert!(addr.starts_with("nova1"));
        assert_eq!(AccountId::parse(&addr).unwrap(), id);
    }

    #[test]
    fn seeds_are_deterministic_and_distinct() {
        assert_eq!(AccountId::from_seed("bob"), AccountId::from_seed("bob"));
        assert_ne!(AccountId::from_seed("bob"), AccountId::from_seed("carol"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            AccountId::parse("not an address"),
            Err(AccountIdError::Bech32Decode(_))
        ));
        assert!(AccountId::parse("").is_err());
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut addr = AccountId::from_seed("alice").to_address();
        let last = addr.pop().unwrap();
        addr.push(if last == 'q' { 'p' } else { 'q' });
        assert!(AccountId::parse(&addr).is_err());
    }

    #[test]
    fn rejects_foreign_prefix() {
        let hrp = Hrp::parse("tnova").unwrap();
        let addr = bech32::encode::<Bech32>(hrp, &[7u8; 32]).unwrap();
        assert!(matches!(
            AccountId::parse(&addr),
            Err(AccountIdError::InvalidHrp { .. })
        ));
    }

    #[test]
    fn rejects_short_key() {
        let hrp = Hrp::parse(ACCOUNT_HRP).unwrap();
        let addr = bech32::encode::<Bech32>(hrp, &[7u8; 20]).unwrap();
        assert_eq!(
            AccountId::parse(&addr),
            Err(AccountIdError::InvalidKeyLength {
                expected: 32,
                got: 20
            })
        );
    }

    #[test]
    fn serde_uses_address_string() {
        let id = AccountId::from_seed("dave");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_address()));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
