//! Core type definitions shared by the build, review and send stages.
//!
//! These are the vocabulary of the session engine's public API: identifiers,
//! assets, currencies, banners and button states. They serialize to the
//! shapes the wallet frontends already speak.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::config::NATIVE_ASSET_CODE;

/// Identifier of a UI sub-session.
///
/// Frontends increment it whenever they remount the send form, so it doubles
/// as a priority: a call from an older sub-session never preempts a newer one.
pub type SessionId = u64;

// ---------------------------------------------------------------------------
// BuildPaymentId
// ---------------------------------------------------------------------------

/// Opaque handle for one build → review → send lifecycle.
///
/// The nil ID selects the legacy session-less build path used by frontends
/// that predate build sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildPaymentId(Uuid);

impl BuildPaymentId {
    /// Generates a fresh random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil ID.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` for the nil ID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for BuildPaymentId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for BuildPaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// An asset that can be held on the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Asset {
    /// The ledger's built-in currency.
    #[default]
    Native,
    /// An issued credit asset.
    Credit {
        /// Asset code, e.g. `USDC`.
        code: String,
        /// Issuing account.
        issuer: AccountId,
    },
}

impl Asset {
    /// Returns `true` for the native asset.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "{}", NATIVE_ASSET_CODE),
            Self::Credit { code, issuer } => write!(f, "{}/{}", code, issuer),
        }
    }
}

// ---------------------------------------------------------------------------
// Outside currency
// ---------------------------------------------------------------------------

/// ISO-4217-style code of a currency that lives outside the ledger (`USD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutsideCurrencyCode(String);

impl OutsideCurrencyCode {
    /// Wraps a currency code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutsideCurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Price of one native unit in an outside currency.
///
/// `rate` is a decimal string: `"0.30"` means 1 NOVA = 0.30 of `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// The outside currency.
    pub currency: OutsideCurrencyCode,
    /// Outside units per native unit.
    pub rate: String,
}

// ---------------------------------------------------------------------------
// Banners & buttons
// ---------------------------------------------------------------------------

/// Severity of a send-form banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerLevel {
    /// Advisory, does not block the payment by itself.
    Info,
    /// Something the user must fix.
    Error,
}

/// A message shown above the send form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendBanner {
    /// Severity.
    pub level: BannerLevel,
    /// Text, may contain `*bold*` markup.
    pub message: String,
}

impl SendBanner {
    /// An advisory banner.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: BannerLevel::Info,
            message: message.into(),
        }
    }

    /// An error banner.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: BannerLevel::Error,
            message: message.into(),
        }
    }
}

/// State of the review screen's send button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextButton {
    /// Review is in progress.
    Spinning,
    /// The payment can be sent.
    Enabled,
    /// The payment cannot be sent.
    Disabled,
}

impl fmt::Display for NextButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spinning => write!(f, "spinning"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
