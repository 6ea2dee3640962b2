//! # Payment Build Service
//!
//! The single entry point frontends call. Owns the session registry, the
//! legacy slot used by session-less callers, the two collaborators and the
//! configuration. Nothing here is process-global: two services share
//! nothing.
//!
//! Every operation takes the caller's cancellation token as `parent`. The
//! slot derives the operation's context from it, so cancelling `parent`
//! (the client went away) and preemption (a newer call for the same build)
//! look the same to the stages.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::build::{
    self, BuildPaymentArgs, BuildPaymentResult, BuildRequestArgs, BuildRequestResult,
};
use crate::cache::BuildPaymentCache;
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::registry::SessionRegistry;
use crate::review::{self, ReviewNotifier};
use crate::session::{ApprovedPayment, SendPaymentArgs, SessionData};
use crate::slot::ConcurrencySlot;
use crate::types::{BuildPaymentId, SessionId};

/// Build, review and send-check of payments.
pub struct PaymentBuildService {
    registry: SessionRegistry,
    legacy_slot: ConcurrencySlot,
    cache: Arc<dyn BuildPaymentCache>,
    notifier: Arc<dyn ReviewNotifier>,
    config: BuildConfig,
}

impl PaymentBuildService {
    /// Creates a service with an empty registry.
    pub fn new(
        cache: Arc<dyn BuildPaymentCache>,
        notifier: Arc<dyn ReviewNotifier>,
        config: BuildConfig,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(config.data_lock_timeout),
            legacy_slot: ConcurrencySlot::new(),
            cache,
            notifier,
            config,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Starts a payment build and returns its ID.
    pub fn start_build_payment(&self) -> BuildPaymentId {
        self.registry.start()
    }

    /// Stops a payment build. Unknown IDs are ignored.
    pub fn stop_build_payment(&self, bid: BuildPaymentId) {
        if !self.registry.stop(bid) {
            debug!(%bid, "stop for unknown payment build");
        }
    }

    /// Validates the send form.
    ///
    /// With a nil `bid` the form is validated on the legacy path: nothing is
    /// frozen and the result cannot be reviewed.
    pub async fn build_payment(
        &self,
        args: &BuildPaymentArgs,
        parent: &CancellationToken,
    ) -> Result<BuildPaymentResult, BuildError> {
        if args.bid.is_nil() {
            let ctx = self.legacy_slot.use_slot(parent, args.session_id);
            return build::build_payment(&ctx, self.cache.as_ref(), &self.config, args, None).await;
        }

        // Contract violations leave the session untouched.
        args.check_sender_selector()?;
        let mut lease = self
            .registry
            .acquire(args.bid, args.session_id, parent)
            .await?;
        let ctx = lease.ctx().clone();
        build::build_payment(
            &ctx,
            self.cache.as_ref(),
            &self.config,
            args,
            Some(lease.data_mut()),
        )
        .await
    }

    /// Validates the request form.
    pub async fn build_request(
        &self,
        args: &BuildRequestArgs,
        parent: &CancellationToken,
    ) -> Result<BuildRequestResult, BuildError> {
        let ctx = self.legacy_slot.use_slot(parent, args.session_id);
        build::build_request(&ctx, self.cache.as_ref(), &self.config, args).await
    }

    /// Reviews the payment last frozen by [`build_payment`](Self::build_payment).
    pub async fn review_payment(
        &self,
        bid: BuildPaymentId,
        session_id: SessionId,
        parent: &CancellationToken,
    ) -> Result<(), BuildError> {
        if bid.is_nil() {
            return Err(BuildError::MissingPaymentId);
        }
        let mut lease = self.registry.acquire(bid, session_id, parent).await?;
        review::review_payment(&mut lease, &self.notifier).await
    }

    /// Clears a send for submission if it matches the reviewed payment.
    pub async fn send_payment(
        &self,
        args: &SendPaymentArgs,
        parent: &CancellationToken,
    ) -> Result<ApprovedPayment, BuildError> {
        if args.bid.is_nil() {
            return Err(BuildError::MissingPaymentId);
        }
        let lease = self
            .registry
            .acquire(args.bid, args.session_id, parent)
            .await?;
        let payment = lease.data().check_ready_to_send(args)?;
        info!(bid = %args.bid, amount = %payment.amount, "payment approved for submission");
        Ok(ApprovedPayment {
            bid: args.bid,
            payment,
        })
    }

    /// A copy of a build's state.
    pub async fn session_state(&self, bid: BuildPaymentId) -> Result<SessionData, BuildError> {
        self.registry.inspect(bid).await
    }

    /// Number of live payment builds.
    pub fn active_builds(&self) -> usize {
        self.registry.len()
    }

    /// Stops every build and cancels every running operation.
    pub fn shutdown(&self) {
        let active = self.registry.len();
        self.registry.clear();
        self.legacy_slot.shutdown();
        info!(active, "payment build service shut down");
    }
}
