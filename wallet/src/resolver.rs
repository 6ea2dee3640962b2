//! # Amount Resolver
//!
//! Turns the amount field of the send form into something the build stage
//! can validate and the UI can display. The amount is denominated in one of
//! two ways, chosen by the caller:
//!
//! - **outside currency** (`currency` set): the user typed e.g. `12.50 USD`.
//!   The amount is converted to native at the current rate, and only counts
//!   as entered once that conversion succeeded, so the user always sees the
//!   native worth they are actually agreeing to send.
//! - **asset** (`asset` set): the user typed a native amount. If the sender
//!   is known, its worth in the sender's preferred currency is shown on a
//!   best-effort basis.
//!
//! Both or neither selected is a caller bug.
//!
//! Field problems come back as `amount_err_msg`. The resolver only returns
//! `Err` when its context is cancelled.

use tracing::{debug, warn};

use crate::account::AccountId;
use crate::amount::{
    self, convert_native_to_outside, convert_outside_to_native, format_native_description,
    format_outside, is_zero_or_blank, AmountError, FormatMode,
};
use crate::cache::BuildPaymentCache;
use crate::config::{NATIVE_ASSET_CODE, RATE_SOURCE};
use crate::error::BuildError;
use crate::slot::SlotContext;
use crate::types::{Asset, ExchangeRate, OutsideCurrencyCode};

/// Input of [`resolve_amount`].
#[derive(Debug, Clone, Copy)]
pub struct AmountArgs<'a> {
    /// Amount text as typed.
    pub amount: &'a str,
    /// Outside currency the amount is denominated in.
    pub currency: Option<&'a OutsideCurrencyCode>,
    /// Asset the amount is denominated in.
    pub asset: Option<&'a Asset>,
    /// Sender, when known. Only used to pick a display currency.
    pub from: Option<AccountId>,
}

/// Output of [`resolve_amount`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmountResolution {
    /// `amount_of_asset` and `asset` are valid and non-zero.
    pub have_amount: bool,
    /// Amount in `asset` units.
    pub amount_of_asset: String,
    /// Asset being sent.
    pub asset: Asset,
    /// Message for the amount field.
    pub amount_err_msg: String,
    /// The amount in the other denomination (`"40 NOVA"` or `"12.00 USD"`).
    pub worth_description: String,
    /// Rate explanation.
    pub worth_info: String,
    /// Outside currency code used for `worth_description`.
    pub worth_currency: String,
    /// Rate used, absent if it could not be fetched.
    pub rate: Option<ExchangeRate>,
    /// Native display string.
    pub display_amount_native: String,
    /// Outside-currency display string.
    pub display_amount_outside: String,
    /// The user is thinking in native units.
    pub sending_intention_native: bool,
}

/// Resolves the amount field.
pub async fn resolve_amount(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    args: AmountArgs<'_>,
) -> Result<AmountResolution, BuildError> {
    match (args.currency, args.asset) {
        (Some(currency), None) => resolve_outside(ctx, cache, args.amount, currency).await,
        (None, Some(asset)) => resolve_asset(ctx, cache, args.amount, asset, args.from).await,
        _ => {
            warn!("exactly one of asset and currency must be set");
            Ok(AmountResolution {
                amount_err_msg: "Error in communication".to_string(),
                ..AmountResolution::default()
            })
        }
    }
}

async fn resolve_outside(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    amount: &str,
    currency: &OutsideCurrencyCode,
) -> Result<AmountResolution, BuildError> {
    let mut res = AmountResolution {
        sending_intention_native: false,
        ..AmountResolution::default()
    };

    // Zero still gets converted so the UI can show a quote.
    let mut outside = "0";
    if !is_zero_or_blank(amount) {
        match amount::parse_outside(amount) {
            Ok(value) if value > 0 => outside = amount,
            Ok(0) => {}
            _ => {
                res.amount_err_msg = "Invalid amount.".to_string();
                return Ok(res);
            }
        }
    }

    let rate = match ctx.run(cache.outside_exchange_rate(ctx.token(), currency)).await? {
        Ok(rate) => rate,
        Err(e) => {
            debug!(%currency, error = %e, "could not get exchange rate");
            res.amount_err_msg = format!("Could not get exchange rate for {}", currency);
            return Ok(res);
        }
    };
    res.rate = Some(rate.clone());

    let converted = convert_outside_to_native(outside, &rate.rate)
        .and_then(|native| Ok((format_native_description(&native)?, native)));
    let (description, native) = match converted {
        Ok(pair) => pair,
        Err(e) => {
            debug!(outside, rate = %rate.rate, error = %e, "could not convert to native");
            res.amount_err_msg = format!("Could not convert to {}", NATIVE_ASSET_CODE);
            return Ok(res);
        }
    };

    res.amount_of_asset = native;
    res.worth_description = description.clone();
    res.worth_currency = currency.to_string();
    // Only a non-zero amount the user has seen the worth of can be sent.
    res.have_amount = outside != "0";
    res.worth_info = worth_info(&rate).unwrap_or_else(|e| {
        debug!(error = %e, "could not build worth info");
        String::new()
    });
    res.display_amount_native = description;
    res.display_amount_outside =
        format_outside(outside, currency, FormatMode::Round).unwrap_or_else(|e| {
            debug!(outside, %currency, error = %e, "could not format outside amount");
            String::new()
        });
    Ok(res)
}

async fn resolve_asset(
    ctx: &SlotContext,
    cache: &dyn BuildPaymentCache,
    amount: &str,
    asset: &Asset,
    from: Option<AccountId>,
) -> Result<AmountResolution, BuildError> {
    let mut res = AmountResolution {
        asset: asset.clone(),
        sending_intention_native: true,
        ..AmountResolution::default()
    };

    let mut use_amount = "0";
    if !is_zero_or_blank(amount) {
        match amount::parse_native(amount) {
            Ok(photons) if photons > 0 => {
                res.amount_of_asset = amount.to_string();
                res.have_amount = true;
                use_amount = amount;
            }
            _ => {
                res.amount_err_msg = "Invalid amount.".to_string();
                return Ok(res);
            }
        }
    }

    if !asset.is_native() {
        // No worth shown for issued assets.
        res.sending_intention_native = false;
        return Ok(res);
    }

    // Everything below is display only; failures just leave it blank.
    let Some(from) = from else {
        debug!("no sender, skipping outside-currency worth");
        return Ok(res);
    };
    let currency = match ctx
        .run(cache.outside_currency_preference(ctx.token(), &from))
        .await?
    {
        Ok(currency) => currency,
        Err(e) => {
            debug!(%from, error = %e, "could not get preferred currency");
            return Ok(res);
        }
    };
    let rate = match ctx.run(cache.outside_exchange_rate(ctx.token(), &currency)).await? {
        Ok(rate) => rate,
        Err(e) => {
            debug!(%currency, error = %e, "could not get exchange rate");
            return Ok(res);
        }
    };
    res.rate = Some(rate.clone());

    let formatted = convert_native_to_outside(use_amount, &rate.rate)
        .and_then(|outside| format_outside(&outside, &rate.currency, FormatMode::Round));
    let formatted = match formatted {
        Ok(formatted) => formatted,
        Err(e) => {
            debug!(use_amount, rate = %rate.rate, error = %e, "could not convert to outside");
            return Ok(res);
        }
    };

    res.worth_description = formatted.clone();
    res.worth_currency = currency.to_string();
    res.worth_info = worth_info(&rate).unwrap_or_else(|e| {
        debug!(error = %e, "could not build worth info");
        String::new()
    });
    res.display_amount_native = format_native_description(amount).unwrap_or_default();
    if !amount.is_empty() {
        res.display_amount_outside = formatted;
    }
    Ok(res)
}

/// `"1.00 USD = 3.3333333 NOVA\nSource: …"`
fn worth_info(rate: &ExchangeRate) -> Result<String, AmountError> {
    let one_outside = format_outside("1", &rate.currency, FormatMode::Round)?;
    let one_in_native = format_native_description(&convert_outside_to_native("1", &rate.rate)?)?;
    Ok(format!("{} = {}\n{}", one_outside, one_in_native, RATE_SOURCE))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::cache::{CacheOp, MemoryCache};

    fn usd() -> OutsideCurrencyCode {
        OutsideCurrencyCode::new("USD")
    }

    fn me() -> AccountId {
        AccountId::from_seed("me")
    }

    fn cache() -> MemoryCache {
        MemoryCache::builder()
            .primary_account(me(), "100")
            .rate(usd(), "0.30")
            .currency_preference(me(), usd())
            .build()
    }

    fn ctx() -> SlotContext {
        SlotContext::detached(&CancellationToken::new(), 1)
    }

    async fn outside(cache: &MemoryCache, amount: &str) -> AmountResolution {
        let currency = usd();
        let args = AmountArgs {
            amount,
            currency: Some(&currency),
            asset: None,
            from: Some(me()),
        };
        resolve_amount(&ctx(), cache, args).await.unwrap()
    }

    async fn native(cache: &MemoryCache, amount: &str, from: Option<AccountId>) -> AmountResolution {
        let asset = Asset::Native;
        let args = AmountArgs {
            amount,
            currency: None,
            asset: Some(&asset),
            from,
        };
        resolve_amount(&ctx(), cache, args).await.unwrap()
    }

    // -- outside currency -----------------------------------------------------

    #[tokio::test]
    async fn outside_amount_converts() {
        let res = outside(&cache(), "3").await;
        assert!(res.have_amount);
        assert!(!res.sending_intention_native);
        assert_eq!(res.amount_of_asset, "10.0000000");
        assert_eq!(res.worth_description, "10 NOVA");
        assert_eq!(res.worth_currency, "USD");
        assert_eq!(res.display_amount_native, "10 NOVA");
        assert_eq!(res.display_amount_outside, "3.00 USD");
        assert_eq!(
            res.worth_info,
            "1.00 USD = 3.3333333 NOVA\nSource: NOVA rate oracle"
        );
        assert!(res.amount_err_msg.is_empty());
    }

    #[tokio::test]
    async fn outside_zero_still_quotes() {
        for amount in ["", "0", "0.0", "0.00"] {
            let res = outside(&cache(), amount).await;
            assert!(!res.have_amount, "{amount:?}");
            assert!(res.amount_err_msg.is_empty(), "{amount:?}");
            assert_eq!(res.worth_description, "0 NOVA");
            assert!(res.rate.is_some());
        }
    }

    #[tokio::test]
    async fn outside_invalid_amounts() {
        for amount in ["-1", "abc", "1.2.3", "17014118346046923173168730371588.9999999"] {
            let res = outside(&cache(), amount).await;
            assert_eq!(res.amount_err_msg, "Invalid amount.", "{amount:?}");
            assert!(!res.have_amount);
        }
    }

    #[tokio::test]
    async fn outside_rate_unavailable() {
        let cache = cache();
        cache.fail(CacheOp::OutsideExchangeRate);
        let res = outside(&cache, "5").await;
        assert_eq!(res.amount_err_msg, "Could not get exchange rate for USD");
        assert!(!res.have_amount);
    }

    #[tokio::test]
    async fn outside_bad_rate_fails_conversion() {
        let cache = cache();
        cache.set_rate(usd(), "0");
        let res = outside(&cache, "5").await;
        assert_eq!(res.amount_err_msg, "Could not convert to NOVA");
        assert!(!res.have_amount);
    }

    // -- native ---------------------------------------------------------------

    #[tokio::test]
    async fn native_amount_with_worth() {
        let res = native(&cache(), "10", Some(me())).await;
        assert!(res.have_amount);
        assert!(res.sending_intention_native);
        assert_eq!(res.amount_of_asset, "10");
        assert_eq!(res.worth_description, "3.00 USD");
        assert_eq!(res.worth_currency, "USD");
        assert_eq!(res.display_amount_native, "10 NOVA");
        assert_eq!(res.display_amount_outside, "3.00 USD");
    }

    #[tokio::test]
    async fn native_zero_is_not_an_error() {
        for amount in ["", "0", "0.0", "0.00"] {
            let res = native(&cache(), amount, Some(me())).await;
            assert!(!res.have_amount, "{amount:?}");
            assert!(res.amount_err_msg.is_empty(), "{amount:?}");
        }
        let blank = native(&cache(), "", Some(me())).await;
        assert!(blank.display_amount_outside.is_empty());
    }

    #[tokio::test]
    async fn native_invalid_amounts() {
        for amount in ["-3", "x", "0.00000001"] {
            let res = native(&cache(), amount, None).await;
            assert_eq!(res.amount_err_msg, "Invalid amount.", "{amount:?}");
        }
    }

    #[tokio::test]
    async fn native_worth_is_best_effort() {
        let no_sender = native(&cache(), "10", None).await;
        assert!(no_sender.have_amount);
        assert!(no_sender.worth_description.is_empty());

        let cache = cache();
        cache.fail(CacheOp::OutsideCurrencyPreference);
        let no_pref = native(&cache, "10", Some(me())).await;
        assert!(no_pref.have_amount);
        assert!(no_pref.amount_err_msg.is_empty());
        assert!(no_pref.worth_description.is_empty());
    }

    #[tokio::test]
    async fn issued_asset_has_no_worth() {
        let asset = Asset::Credit {
            code: "USDC".into(),
            issuer: AccountId::from_seed("issuer"),
        };
        let args = AmountArgs {
            amount: "4",
            currency: None,
            asset: Some(&asset),
            from: Some(me()),
        };
        let res = resolve_amount(&ctx(), &cache(), args).await.unwrap();
        assert!(res.have_amount);
        assert!(!res.sending_intention_native);
        assert_eq!(res.asset, asset);
        assert!(res.worth_description.is_empty());
    }

    // -- selectors & cancellation ---------------------------------------------

    #[tokio::test]
    async fn both_or_neither_selector_is_a_contract_violation() {
        let currency = usd();
        let asset = Asset::Native;
        for (currency, asset) in [(Some(&currency), Some(&asset)), (None, None)] {
            let args = AmountArgs {
                amount: "1",
                currency,
                asset,
                from: None,
            };
            let res = resolve_amount(&ctx(), &cache(), args).await.unwrap();
            assert_eq!(res.amount_err_msg, "Error in communication");
            assert!(!res.have_amount);
        }
    }

    #[tokio::test]
    async fn cancelled_context_is_reported() {
        let parent = CancellationToken::new();
        let ctx = SlotContext::detached(&parent, 1);
        parent.cancel();

        let currency = usd();
        let args = AmountArgs {
            amount: "1",
            currency: Some(&currency),
            asset: None,
            from: None,
        };
        let err = resolve_amount(&ctx, &cache(), args).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
