//! # Build Stage
//!
//! Validates one snapshot of the send form. The stages run in order and
//! never short-circuit on a field problem, so the UI gets feedback for every
//! field in a single round trip:
//!
//! ```text
//! from ──► to ──► amount ──► note/memo ──► finalize
//!  │        │        │           │             │
//!  │        │        │           │             └─ all flags set? freeze snapshot
//!  │        │        │           └─ byte caps
//!  │        │        └─ resolver, balance minus fee, recipient floor
//!  │        └─ address / lookup, relay rules, funding floors
//!  └─ primary or explicit owned account
//! ```
//!
//! Only contract violations, a non-native asset and cancellation fail a
//! build. Everything else becomes a field message or a banner.

use std::cmp::Ordering;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::account::AccountId;
use crate::amount::{
    compare_native, convert_native_to_outside, format_native, format_outside, subtract_fee_soft,
    FormatMode,
};
use crate::cache::BuildPaymentCache;
use crate::checklist::{BuildKind, ReadinessChecklist};
use crate::config::{BuildConfig, NATIVE_ASSET_CODE, RELAY_MIN_AMOUNT, UNFUNDED_MIN_AMOUNT};
use crate::error::BuildError;
use crate::resolver::{resolve_amount, AmountArgs, AmountResolution};
use crate::session::{FrozenPayment, SessionData};
use crate::slot::SlotContext;
use crate::types::{Asset, BuildPaymentId, OutsideCurrencyCode, SendBanner, SessionId};

// ---------------------------------------------------------------------------
// Arguments & results
// ---------------------------------------------------------------------------

/// Current contents of the send form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildPaymentArgs {
    /// Build session; nil selects the session-less path.
    pub bid: BuildPaymentId,
    /// UI sub-session.
    pub session_id: SessionId,
    /// Explicit sending account.
    pub from: Option<AccountId>,
    /// Send from the primary account instead.
    pub from_primary_account: bool,
    /// Recipient input.
    pub to: String,
    /// `to` is a literal account address.
    pub to_is_account_id: bool,
    /// Amount text.
    pub amount: String,
    /// Outside currency the amount is in.
    pub currency: Option<OutsideCurrencyCode>,
    /// Asset the amount is in.
    pub asset: Option<Asset>,
    /// Encrypted note.
    pub secret_note: String,
    /// Public memo.
    pub public_memo: String,
}

/// Outcome of a payment build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPaymentResult {
    pub ready_to_review: bool,
    pub from: Option<AccountId>,
    pub to_err_msg: String,
    pub amount_err_msg: String,
    pub secret_note_err_msg: String,
    pub public_memo_err_msg: String,
    pub worth_description: String,
    pub worth_info: String,
    pub worth_amount: String,
    pub worth_currency: String,
    pub display_amount_native: String,
    pub display_amount_outside: String,
    pub sending_intention_native: bool,
    pub banners: Vec<SendBanner>,
}

/// Current contents of the request form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRequestArgs {
    /// UI sub-session.
    pub session_id: SessionId,
    /// Who is asked to pay.
    pub to: String,
    /// Amount text.
    pub amount: String,
    /// Outside currency the amount is in.
    pub currency: Option<OutsideCurrencyCode>,
    /// Asset the amount is in.
    pub asset: Option<Asset>,
    /// Note attached to the request.
    pub secret_note: String,
}

/// Outcome of a request build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildRequestResult {
    pub ready_to_request: bool,
    pub to_err_msg: String,
    pub amount_err_msg: String,
    pub secret_note_err_msg: String,
    pub worth_description: String,
    pub worth_info: String,
    pub worth_currency: String,
    pub display_amount_native: String,
    pub display_amount_outside: String,
    pub sending_intention_native: bool,
    pub banners: Vec<SendBanner>,
}

impl BuildPaymentArgs {
    /// Exactly one of `from` and `from_primary_account` must be set.
    pub fn check_sender_selector(&self) -> Result<(), BuildError> {
        if self.from_primary_account == self.from.is_some() {
            warn!(bid = %self.bid, "exactly one of from and from_primary_account must be set");
            return Err(BuildError::InvalidParameters(
                "exactly one of from and from_primary_account must be set".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Payment build
// ---------------------------------------------------------------------------

struct Sender {
    account: Option<AccountId>,
    is_primary: bool,
}

/// Validates a payment form.
///
/// With `data` (session path), readiness and the snapshot are dropped before
/// validating and a new snapshot is frozen only if every check passed and
/// the context is still live. A cancelled context wins over any result.
pub async fn build_payment(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    config: &BuildConfig,
    args: &BuildPaymentArgs,
    mut data: Option<&mut SessionData>,
) -> Result<BuildPaymentResult, BuildError> {
    args.check_sender_selector()?;
    if let Some(data) = data.as_deref_mut() {
        data.reset();
    }

    let mut res = BuildPaymentResult::default();
    let mut checklist = ReadinessChecklist::default();

    let sender = check_from(ctx, cache, args, &mut res).await?;
    if let Some(from) = sender.account {
        res.from = Some(from);
        checklist.from = true;
    }

    let min_amount = check_to(ctx, cache, args, sender.is_primary, &mut res, &mut checklist).await?;

    let amount = resolve_amount(
        ctx,
        cache,
        AmountArgs {
            amount: &args.amount,
            currency: args.currency.as_ref(),
            asset: args.asset.as_ref(),
            from: sender.account,
        },
    )
    .await?;
    check_amount(ctx, cache, args, &sender, min_amount, &amount, &mut res, &mut checklist).await?;

    if args.secret_note.len() <= config.max_secret_note_bytes {
        checklist.secret_note = true;
    } else {
        res.secret_note_err_msg = "Note is too long.".to_string();
    }
    if args.public_memo.len() <= config.max_public_memo_bytes {
        checklist.public_memo = true;
    } else {
        res.public_memo_err_msg = "Memo is too long.".to_string();
    }

    match sender.account.filter(|_| checklist.is_ready(BuildKind::Payment)) {
        Some(from) => {
            res.ready_to_review = true;
            if let Some(data) = data {
                // Never leave a snapshot behind for a superseded build.
                ctx.err()?;
                data.freeze(FrozenPayment {
                    from,
                    to: args.to.clone(),
                    to_is_account_id: args.to_is_account_id,
                    amount: amount.amount_of_asset.clone(),
                    asset: amount.asset.clone(),
                    secret_note: args.secret_note.clone(),
                    public_memo: args.public_memo.clone(),
                    frozen_at: Utc::now(),
                });
                debug!(bid = %args.bid, "payment ready to review");
            }
        }
        None => {
            debug!(bid = %args.bid, missing = ?checklist.missing(BuildKind::Payment), "payment not ready");
        }
    }

    ctx.err()?;
    Ok(res)
}

async fn check_from(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    args: &BuildPaymentArgs,
    res: &mut BuildPaymentResult,
) -> Result<Sender, BuildError> {
    let mut sender = Sender {
        account: None,
        is_primary: args.from_primary_account,
    };

    match args.from {
        None => match ctx.run(cache.primary_account(ctx.token())).await? {
            Ok(primary) => sender.account = Some(primary),
            Err(e) => {
                debug!(error = %e, "primary account lookup failed");
                res.banners.push(SendBanner::error("Could not find primary account."));
            }
        },
        Some(explicit) => match ctx.run(cache.owns_account(ctx.token(), &explicit)).await? {
            Ok(ownership) if ownership.owns => {
                sender.account = Some(explicit);
                sender.is_primary = ownership.is_primary;
            }
            other => {
                debug!(from = %explicit, result = ?other, "source account not owned");
                res.banners.push(SendBanner::error("Could not find source account."));
            }
        },
    }
    Ok(sender)
}

/// Returns the minimum amount the recipient requires, if any.
async fn check_to(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    args: &BuildPaymentArgs,
    from_primary: bool,
    res: &mut BuildPaymentResult,
    checklist: &mut ReadinessChecklist,
) -> Result<Option<&'static str>, BuildError> {
    if args.to.is_empty() {
        return Ok(None);
    }
    if args.to_is_account_id {
        match AccountId::parse(&args.to) {
            Ok(_) => checklist.to = true,
            Err(e) => {
                res.to_err_msg = e.to_string();
                return Ok(None);
            }
        }
    }

    let recipient = match ctx.run(cache.lookup_recipient(ctx.token(), &args.to)).await? {
        Ok(recipient) => recipient,
        Err(e) => {
            debug!(to = %args.to, error = %e, "recipient lookup failed");
            res.to_err_msg = "Recipient not found.".to_string();
            return Ok(None);
        }
    };

    let (they, their) = match (&recipient.username, args.to_is_account_id) {
        (Some(name), false) => (name.clone(), format!("{}'s", name)),
        _ => ("they".to_string(), "their".to_string()),
    };

    let Some(account) = recipient.account_id else {
        if !from_primary {
            // Relays can only be funded from the primary account.
            res.banners.push(SendBanner::error(format!(
                "Because {} hasn’t set up their wallet yet, you can only send to them from your default account.",
                they
            )));
            return Ok(None);
        }
        checklist.to = true;
        res.banners.push(first_transaction_banner(&their, RELAY_MIN_AMOUNT));
        return Ok(Some(RELAY_MIN_AMOUNT));
    };
    checklist.to = true;

    match ctx.run(cache.is_account_funded(ctx.token(), &account)).await? {
        Ok(true) => Ok(None),
        Ok(false) => {
            let ownership = ctx.run(cache.owns_account(ctx.token(), &account)).await?;
            debug!(to = %account, result = ?ownership, "recipient account is unfunded");
            match ownership {
                Ok(own) if own.owns => res.banners.push(SendBanner::info(format!(
                    "Because it's the first transaction on your receiving account, you must send at least {} {}.",
                    UNFUNDED_MIN_AMOUNT, NATIVE_ASSET_CODE
                ))),
                _ => res.banners.push(first_transaction_banner(&their, UNFUNDED_MIN_AMOUNT)),
            }
            Ok(Some(UNFUNDED_MIN_AMOUNT))
        }
        Err(e) => {
            debug!(to = %account, error = %e, "could not check recipient funding");
            Ok(None)
        }
    }
}

fn first_transaction_banner(their: &str, min_amount: &str) -> SendBanner {
    SendBanner::info(format!(
        "Because it's {} first transaction, you must send at least {} {}.",
        their, min_amount, NATIVE_ASSET_CODE
    ))
}

#[allow(clippy::too_many_arguments)]
async fn check_amount(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    args: &BuildPaymentArgs,
    sender: &Sender,
    min_amount: Option<&str>,
    amount: &AmountResolution,
    res: &mut BuildPaymentResult,
    checklist: &mut ReadinessChecklist,
) -> Result<(), BuildError> {
    res.amount_err_msg = amount.amount_err_msg.clone();
    res.worth_description = amount.worth_description.clone();
    res.worth_info = amount.worth_info.clone();
    res.worth_currency = amount.worth_currency.clone();
    res.display_amount_native = amount.display_amount_native.clone();
    res.display_amount_outside = amount.display_amount_outside.clone();
    res.sending_intention_native = amount.sending_intention_native;

    if amount.have_amount {
        if !amount.asset.is_native() {
            return Err(BuildError::UnsupportedAsset(amount.asset.to_string()));
        }
        checklist.amount = true;

        if let Some(from) = sender.account {
            match ctx.run(cache.available_to_send(ctx.token(), &from)).await? {
                Ok(available) => {
                    let available = subtract_fee_soft(&available);
                    match compare_native(&available, &amount.amount_of_asset) {
                        Ok(Ordering::Less) => {
                            debug!(amount = %amount.amount_of_asset, %available, "amount exceeds available to send");
                            checklist.amount = false;
                            res.amount_err_msg =
                                available_to_send_message(&available, args.currency.as_ref(), amount);
                        }
                        Ok(_) => {}
                        Err(e) => debug!(%available, amount = %amount.amount_of_asset, error = %e, "could not compare amounts"),
                    }
                }
                Err(e) => debug!(%from, error = %e, "could not get available balance"),
            }
        }

        if let Some(min_amount) = min_amount {
            match compare_native(&amount.amount_of_asset, min_amount) {
                Ok(Ordering::Less) => {
                    checklist.amount = false;
                    res.amount_err_msg =
                        format!("You must send at least *{} {}*", min_amount, NATIVE_ASSET_CODE);
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "could not compare amount to minimum"),
            }
        }
    }

    // Saves the GUI a formatting call.
    if args.currency.is_some() {
        res.worth_amount = amount.amount_of_asset.clone();
    }
    Ok(())
}

/// "Your available to send is *X*." in the unit the user is typing in.
fn available_to_send_message(
    available: &str,
    currency: Option<&OutsideCurrencyCode>,
    amount: &AmountResolution,
) -> String {
    if let (Some(_), Some(rate)) = (currency, amount.rate.as_ref()) {
        let outside = convert_native_to_outside(available, &rate.rate)
            .and_then(|outside| format_outside(&outside, &rate.currency, FormatMode::Truncate));
        match outside {
            Ok(formatted) => return format!("Your available to send is *{}*.", formatted),
            Err(e) => debug!(%available, error = %e, "could not convert available to send"),
        }
    }
    let native = format_native(available).unwrap_or_else(|_| available.to_string());
    format!("Your available to send is *{} {}*.", native, NATIVE_ASSET_CODE)
}

// ---------------------------------------------------------------------------
// Request build
// ---------------------------------------------------------------------------

/// Validates a payment request form. Requests have no session.
pub async fn build_request(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    config: &BuildConfig,
    args: &BuildRequestArgs,
) -> Result<BuildRequestResult, BuildError> {
    ctx.err()?;

    let mut res = BuildRequestResult::default();
    let mut checklist = ReadinessChecklist::default();

    if !args.to.is_empty() {
        match ctx.run(cache.lookup_recipient(ctx.token(), &args.to)).await? {
            Ok(_) => checklist.to = true,
            Err(e) => {
                debug!(to = %args.to, error = %e, "recipient lookup failed");
                res.to_err_msg = "Recipient not found.".to_string();
            }
        }
    }

    // Requests are always paid into the primary account.
    let from = match ctx.run(cache.primary_account(ctx.token())).await? {
        Ok(primary) => Some(primary),
        Err(e) => {
            debug!(error = %e, "primary account lookup failed");
            res.banners.push(SendBanner::error("Could not find primary account."));
            None
        }
    };

    let amount = resolve_amount(
        ctx,
        cache,
        AmountArgs {
            amount: &args.amount,
            currency: args.currency.as_ref(),
            asset: args.asset.as_ref(),
            from,
        },
    )
    .await?;
    res.amount_err_msg = amount.amount_err_msg;
    res.worth_description = amount.worth_description;
    res.worth_info = amount.worth_info;
    res.worth_currency = amount.worth_currency;
    res.display_amount_native = amount.display_amount_native;
    res.display_amount_outside = amount.display_amount_outside;
    res.sending_intention_native = amount.sending_intention_native;
    checklist.amount = amount.have_amount;

    if args.secret_note.len() <= config.max_secret_note_bytes {
        checklist.secret_note = true;
    } else {
        res.secret_note_err_msg = "Note is too long.".to_string();
    }

    res.ready_to_request = checklist.is_ready(BuildKind::Request);
    ctx.err()?;
    Ok(res)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
