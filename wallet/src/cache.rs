//! # Build Payment Cache
//!
//! The payment builder never talks to the ledger, the key store or the rate
//! oracle directly. Everything it needs to know about the world comes through
//! [`BuildPaymentCache`], a narrow async trait whose every method is
//! potentially slow and receives the operation's cancellation token.
//!
//! [`MemoryCache`] implements the trait from in-memory tables. Tests seed it
//! with the builder; `walletd` loads it from a JSON fixture.
//!
//! ```text
//! ┌──────────────┐  primary_account / owns_account      ┌─────────────┐
//! │ build stage  │ ───────────────────────────────────► │ cache impl  │
//! │  (resolver)  │  lookup_recipient / is_account_funded│ (key store, │
//! │              │  outside_exchange_rate / ...         │  ledger...) │
//! └──────────────┘                                      └─────────────┘
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::account::AccountId;
use crate::types::{ExchangeRate, OutsideCurrencyCode};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by a [`BuildPaymentCache`].
///
/// The build stage turns every one of these into a banner or a field
/// message; none of them fails a build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The user has no primary account configured.
    #[error("no primary account")]
    NoPrimaryAccount,

    /// The account is unknown to the cache.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// The recipient input did not resolve to a user or an address.
    #[error("recipient not found: {0:?}")]
    RecipientNotFound(String),

    /// No rate is known for the currency.
    #[error("no exchange rate for {0}")]
    RateNotFound(OutsideCurrencyCode),

    /// No preferred currency is configured for the account.
    #[error("no currency preference for {0}")]
    NoCurrencyPreference(AccountId),

    /// The backing service failed.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The lookup observed cancellation and gave up.
    #[error("lookup cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Ownership of an account by the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountOwnership {
    /// The user holds the account's keys.
    pub owns: bool,
    /// The account is the user's primary (default) account.
    pub is_primary: bool,
}

/// A resolved recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// What the user typed.
    pub input: String,
    /// The recipient's ledger account, absent when they have no wallet yet.
    pub account_id: Option<AccountId>,
    /// The recipient's username, when the input named a user.
    pub username: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Everything the build stage looks up about the outside world.
#[async_trait]
pub trait BuildPaymentCache: Send + Sync {
    /// The user's primary account.
    async fn primary_account(&self, ctx: &CancellationToken) -> Result<AccountId, CacheError>;

    /// Whether the user owns `account`, and whether it is their primary.
    async fn owns_account(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<AccountOwnership, CacheError>;

    /// Resolves recipient input (username or address).
    async fn lookup_recipient(
        &self,
        ctx: &CancellationToken,
        input: &str,
    ) -> Result<Recipient, CacheError>;

    /// Whether `account` exists on the ledger with a balance.
    async fn is_account_funded(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<bool, CacheError>;

    /// Current rate for an outside currency.
    async fn outside_exchange_rate(
        &self,
        ctx: &CancellationToken,
        currency: &OutsideCurrencyCode,
    ) -> Result<ExchangeRate, CacheError>;

    /// The outside currency `account`'s owner prefers for display.
    async fn outside_currency_preference(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<OutsideCurrencyCode, CacheError>;

    /// Native amount `account` can send, before fees.
    async fn available_to_send(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<String, CacheError>;
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// Cache operations, used to inject failures into a [`MemoryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    PrimaryAccount,
    OwnsAccount,
    LookupRecipient,
    IsAccountFunded,
    OutsideExchangeRate,
    OutsideCurrencyPreference,
    AvailableToSend,
}

#[derive(Debug, Default)]
struct Tables {
    primary: Option<AccountId>,
    owned: HashSet<AccountId>,
    funded: HashSet<AccountId>,
    available: HashMap<AccountId, String>,
    /// username -> account, `None` for users without a wallet.
    users: HashMap<String, Option<AccountId>>,
    rates: HashMap<OutsideCurrencyCode, String>,
    preferences: HashMap<AccountId, OutsideCurrencyCode>,
    failing: HashSet<CacheOp>,
}

/// In-memory [`BuildPaymentCache`].
///
/// Optional artificial latency lets tests hold a lookup open long enough to
/// preempt it; the latency observes cancellation and counts the lookups it
/// abandoned.
#[derive(Debug, Default)]
pub struct MemoryCache {
    tables: RwLock<Tables>,
    latency: Option<Duration>,
    lookups: AtomicU64,
    cancelled_lookups: AtomicU64,
}

impl MemoryCache {
    /// Starts building a cache.
    pub fn builder() -> MemoryCacheBuilder {
        MemoryCacheBuilder::default()
    }

    /// Builds a cache from a parsed fixture.
    pub fn from_fixture(fixture: CacheFixture) -> Self {
        let mut builder = Self::builder();

        for account in fixture.accounts {
            let id = AccountId::from_seed(&account.seed);
            builder = match (&account.available, account.primary) {
                (Some(available), true) => builder.primary_account(id, available),
                (Some(available), false) => builder.owned_account(id, available),
                (None, true) => builder.primary_account(id, "0").unfunded(id),
                (None, false) => builder.owned_unfunded_account(id),
            };
            if let Some(currency) = account.currency {
                builder = builder.currency_preference(id, OutsideCurrencyCode::new(currency));
            }
        }

        for user in fixture.users {
            builder = match (user.seed, user.funded) {
                (Some(seed), true) => builder.user(user.username, AccountId::from_seed(&seed)),
                (Some(seed), false) => {
                    builder.unfunded_user(user.username, AccountId::from_seed(&seed))
                }
                (None, _) => builder.user_without_wallet(user.username),
            };
        }

        for (code, rate) in fixture.rates {
            builder = builder.rate(OutsideCurrencyCode::new(code), rate);
        }

        if let Some(ms) = fixture.latency_ms {
            builder = builder.latency(Duration::from_millis(ms));
        }

        builder.build()
    }

    /// Parses a JSON fixture and builds a cache from it.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let fixture: CacheFixture = serde_json::from_str(json)?;
        Ok(Self::from_fixture(fixture))
    }

    /// Number of lookups served or attempted.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of lookups abandoned because their context was cancelled.
    pub fn cancelled_lookups(&self) -> u64 {
        self.cancelled_lookups.load(Ordering::Relaxed)
    }

    /// Makes `op` fail with [`CacheError::Unavailable`] from now on.
    pub fn fail(&self, op: CacheOp) {
        self.tables.write().failing.insert(op);
    }

    /// Sets or replaces the available balance of an account.
    pub fn set_available(&self, account: AccountId, available: impl Into<String>) {
        self.tables.write().available.insert(account, available.into());
    }

    /// Sets or replaces an exchange rate.
    pub fn set_rate(&self, currency: OutsideCurrencyCode, rate: impl Into<String>) {
        self.tables.write().rates.insert(currency, rate.into());
    }

    /// Accounts the user owns.
    pub fn owned_accounts(&self) -> Vec<AccountId> {
        self.tables.read().owned.iter().copied().collect()
    }

    /// Common prologue of every lookup: count it, honour injected failures
    /// and wait out the configured latency unless cancelled first.
    async fn enter(&self, ctx: &CancellationToken, op: CacheOp) -> Result<(), CacheError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(latency) => {}
            }
        }
        if ctx.is_cancelled() {
            self.cancelled_lookups.fetch_add(1, Ordering::Relaxed);
            debug!(?op, "lookup cancelled");
            return Err(CacheError::Cancelled);
        }

        if self.tables.read().failing.contains(&op) {
            return Err(CacheError::Unavailable(format!("{:?} is failing", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildPaymentCache for MemoryCache {
    async fn primary_account(&self, ctx: &CancellationToken) -> Result<AccountId, CacheError> {
        self.enter(ctx, CacheOp::PrimaryAccount).await?;
        self.tables.read().primary.ok_or(CacheError::NoPrimaryAccount)
    }

    async fn owns_account(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<AccountOwnership, CacheError> {
        self.enter(ctx, CacheOp::OwnsAccount).await?;
        let tables = self.tables.read();
        Ok(AccountOwnership {
            owns: tables.owned.contains(account),
            is_primary: tables.primary.as_ref() == Some(account),
        })
    }

    async fn lookup_recipient(
        &self,
        ctx: &CancellationToken,
        input: &str,
    ) -> Result<Recipient, CacheError> {
        self.enter(ctx, CacheOp::LookupRecipient).await?;
        let tables = self.tables.read();

        if let Ok(account) = AccountId::parse(input) {
            let username = tables
                .users
                .iter()
                .find(|(_, id)| id.as_ref() == Some(&account))
                .map(|(name, _)| name.clone());
            return Ok(Recipient {
                input: input.to_string(),
                account_id: Some(account),
                username,
            });
        }

        match tables.users.get(input) {
            Some(account_id) => Ok(Recipient {
                input: input.to_string(),
                account_id: *account_id,
                username: Some(input.to_string()),
            }),
            None => Err(CacheError::RecipientNotFound(input.to_string())),
        }
    }

    async fn is_account_funded(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<bool, CacheError> {
        self.enter(ctx, CacheOp::IsAccountFunded).await?;
        Ok(self.tables.read().funded.contains(account))
    }

    async fn outside_exchange_rate(
        &self,
        ctx: &CancellationToken,
        currency: &OutsideCurrencyCode,
    ) -> Result<ExchangeRate, CacheError> {
        self.enter(ctx, CacheOp::OutsideExchangeRate).await?;
        self.tables
            .read()
            .rates
            .get(currency)
            .map(|rate| ExchangeRate {
                currency: currency.clone(),
                rate: rate.clone(),
            })
            .ok_or_else(|| CacheError::RateNotFound(currency.clone()))
    }

    async fn outside_currency_preference(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<OutsideCurrencyCode, CacheError> {
        self.enter(ctx, CacheOp::OutsideCurrencyPreference).await?;
        self.tables
            .read()
            .preferences
            .get(account)
            .cloned()
            .ok_or(CacheError::NoCurrencyPreference(*account))
    }

    async fn available_to_send(
        &self,
        ctx: &CancellationToken,
        account: &AccountId,
    ) -> Result<String, CacheError> {
        self.enter(ctx, CacheOp::AvailableToSend).await?;
        self.tables
            .read()
            .available
            .get(account)
            .cloned()
            .ok_or(CacheError::AccountNotFound(*account))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Seeds a [`MemoryCache`].
#[derive(Debug, Default)]
pub struct MemoryCacheBuilder {
    tables: Tables,
    latency: Option<Duration>,
}

impl MemoryCacheBuilder {
    /// The user's primary account, funded with `available`.
    pub fn primary_account(mut self, id: AccountId, available: impl Into<String>) -> Self {
        self.tables.primary = Some(id);
        self.owned_account(id, available)
    }

    /// A funded non-primary account the user owns.
    pub fn owned_account(mut self, id: AccountId, available: impl Into<String>) -> Self {
        self.tables.owned.insert(id);
        self.tables.funded.insert(id);
        self.tables.available.insert(id, available.into());
        self
    }

    /// An account the user owns that has never been funded.
    pub fn owned_unfunded_account(mut self, id: AccountId) -> Self {
        self.tables.owned.insert(id);
        self.tables.available.insert(id, "0".to_string());
        self
    }

    /// Marks an account as unfunded.
    pub fn unfunded(mut self, id: AccountId) -> Self {
        self.tables.funded.remove(&id);
        self
    }

    /// A user whose wallet account is funded.
    pub fn user(mut self, username: impl Into<String>, account: AccountId) -> Self {
        self.tables.users.insert(username.into(), Some(account));
        self.tables.funded.insert(account);
        self
    }

    /// A user whose wallet account exists but holds nothing yet.
    pub fn unfunded_user(mut self, username: impl Into<String>, account: AccountId) -> Self {
        self.tables.users.insert(username.into(), Some(account));
        self.tables.funded.remove(&account);
        self
    }

    /// A user who has not set up a wallet; payments to them are relayed.
    pub fn user_without_wallet(mut self, username: impl Into<String>) -> Self {
        self.tables.users.insert(username.into(), None);
        self
    }

    /// A funded ledger account not tied to any user.
    pub fn funded_account(mut self, id: AccountId) -> Self {
        self.tables.funded.insert(id);
        self
    }

    /// An exchange rate: outside units per native unit.
    pub fn rate(mut self, currency: OutsideCurrencyCode, rate: impl Into<String>) -> Self {
        self.tables.rates.insert(currency, rate.into());
        self
    }

    /// Preferred display currency of an account's owner.
    pub fn currency_preference(mut self, account: AccountId, currency: OutsideCurrencyCode) -> Self {
        self.tables.preferences.insert(account, currency);
        self
    }

    /// Delay applied to every lookup.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Finishes the cache.
    pub fn build(self) -> MemoryCache {
        MemoryCache {
            tables: RwLock::new(self.tables),
            latency: self.latency,
            lookups: AtomicU64::new(0),
            cancelled_lookups: AtomicU64::new(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// JSON description of a [`MemoryCache`].
///
/// Accounts are derived from seeds so fixtures stay readable:
///
/// ```json
/// {
///   "accounts": [{ "seed": "me", "primary": true, "available": "100", "currency": "USD" }],
///   "users": [{ "username": "alice", "seed": "alice" }, { "username": "carol" }],
///   "rates": { "USD": "0.30" }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheFixture {
    /// The user's own accounts.
    pub accounts: Vec<FixtureAccount>,
    /// Known recipients.
    pub users: Vec<FixtureUser>,
    /// Outside currency code -> outside units per native unit.
    pub rates: BTreeMap<String, String>,
    /// Artificial lookup latency in milliseconds.
    pub latency_ms: Option<u64>,
}

/// One of the user's accounts in a [`CacheFixture`].
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureAccount {
    /// Seed the account ID is derived from.
    pub seed: String,
    /// Whether this is the primary account.
    #[serde(default)]
    pub primary: bool,
    /// Available balance; absent for an unfunded account.
    #[serde(default)]
    pub available: Option<String>,
    /// Preferred outside currency.
    #[serde(default)]
    pub currency: Option<String>,
}

/// A recipient in a [`CacheFixture`].
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureUser {
    /// Username the recipient is looked up by.
    pub username: String,
    /// Seed of the recipient's account; absent when they have no wallet.
    #[serde(default)]
    pub seed: Option<String>,
    /// Whether the account is funded.
    #[serde(default = "default_funded")]
    pub funded: bool,
}

fn default_funded() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
