//! # Preempting Concurrency Slot
//!
//! A slot admits one build-or-review operation per payment build at a time.
//! A new operation does not queue behind a stale one. It cancels it:
//!
//! ```text
//! use_slot(parent, 7)  -> ctx A        (occupant: A)
//! use_slot(parent, 7)  -> ctx B        (A cancelled, occupant: B)
//! use_slot(parent, 3)  -> ctx C        (C born cancelled, occupant: B)
//! ```
//!
//! The UI sub-session id is a priority. Frontends bump it when the send form
//! is remounted, so a late call from an old form (lower id) can never
//! displace the live one. Equal or higher ids preempt.
//!
//! The swap happens under a `parking_lot::Mutex` that is held for the swap
//! only; the operation body runs outside it.

use std::future::Future;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BuildError;
use crate::types::SessionId;

// ---------------------------------------------------------------------------
// SlotContext
// ---------------------------------------------------------------------------

/// Cancellable execution context handed out by [`ConcurrencySlot::use_slot`].
///
/// Every suspending call in an operation goes through [`SlotContext::run`]
/// (or observes [`SlotContext::token`] itself), so preemption and caller
/// cancellation surface as [`BuildError::Cancelled`] and nothing else.
#[derive(Debug, Clone)]
pub struct SlotContext {
    token: CancellationToken,
    session_id: SessionId,
}

impl SlotContext {
    /// A context that is not attached to any slot.
    pub fn detached(parent: &CancellationToken, session_id: SessionId) -> Self {
        Self {
            token: parent.child_token(),
            session_id,
        }
    }

    /// Returns `true` once this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(Cancelled)` once cancelled, `Ok(())` otherwise.
    pub fn err(&self) -> Result<(), BuildError> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The underlying token, for collaborators.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The UI sub-session this context was issued to.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Runs `fut` against this context.
    ///
    /// Checks for cancellation before starting, races the future against
    /// cancellation, and checks again after it completes so a cancellation
    /// that lands together with a result still wins.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, BuildError>
    where
        F: Future,
    {
        self.err()?;
        // The future is polled first so collaborators that watch the token
        // themselves get to observe the cancellation.
        let output = tokio::select! {
            biased;
            output = fut => output,
            _ = self.token.cancelled() => return Err(BuildError::Cancelled),
        };
        self.err()?;
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// ConcurrencySlot
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Occupant {
    token: CancellationToken,
    session_id: SessionId,
}

/// Per-session preempting gate.
#[derive(Debug, Default)]
pub struct ConcurrencySlot {
    occupant: Mutex<Option<Occupant>>,
}

impl ConcurrencySlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `session_id` and returns a child of `parent`.
    ///
    /// The previous occupant's context is cancelled unless it belongs to a
    /// newer sub-session, in which case the returned context is cancelled
    /// instead and the occupant keeps running.
    pub fn use_slot(&self, parent: &CancellationToken, session_id: SessionId) -> SlotContext {
        let token = parent.child_token();
        let mut occupant = self.occupant.lock();

        if let Some(current) = occupant.as_ref() {
            if session_id < current.session_id {
                debug!(
                    session_id,
                    occupant = current.session_id,
                    "slot held by newer sub-session, refusing"
                );
                token.cancel();
                return SlotContext { token, session_id };
            }
            current.token.cancel();
        }

        *occupant = Some(Occupant {
            token: token.clone(),
            session_id,
        });
        SlotContext { token, session_id }
    }

    /// Cancels the current occupant and empties the slot.
    pub fn shutdown(&self) {
        if let Some(current) = self.occupant.lock().take() {
            current.token.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    // -- preemption -----------------------------------------------------------

    #[test]
    fn second_use_cancels_first() {
        let slot = ConcurrencySlot::new();
        let parent = CancellationToken::new();

        let first = slot.use_slot(&parent, 1);
        assert!(!first.is_cancelled());

        let second = slot.use_slot(&parent, 1);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(first.err().unwrap_err().is_cancelled());
        assert!(second.err().is_ok());
    }

    #[test]
    fn higher_session_preempts() {
        let slot = ConcurrencySlot::new();
        let parent = CancellationToken::new();

        let old = slot.use_slot(&parent, 4);
        let new = slot.use_slot(&parent, 5);
        assert!(old.is_cancelled());
        assert!(!new.is_cancelled());
    }

    #[test]
    fn lower_session_is_refused() {
        let slot = ConcurrencySlot::new();
        let parent = CancellationToken::new();

        let live = slot.use_slot(&parent, 9);
        let stale = slot.use_slot(&parent, 2);
        assert!(stale.is_cancelled());
        assert!(!live.is_cancelled());

        // The newer occupant is still the one to beat.
        let again = slot.use_slot(&parent, 8);
        assert!(again.is_cancelled());
    }

    // -- parent & shutdown ----------------------------------------------------

    #[test]
    fn parent_cancellation_propagates() {
        let slot = ConcurrencySlot::new();
        let parent = CancellationToken::new();
        let ctx = slot.use_slot(&parent, 1);

        parent.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn shutdown_cancels_and_frees() {
        let slot = ConcurrencySlot::new();
        let parent = CancellationToken::new();
        let ctx = slot.use_slot(&parent, 10);

        slot.shutdown();
        assert!(ctx.is_cancelled());

        // Empty slot: any sub-session may claim it.
        let next = slot.use_slot(&parent, 1);
        assert!(!next.is_cancelled());
    }

    // -- run ------------------------------------------------------------------

    #[tokio::test]
    async fn run_returns_output() {
        let ctx = SlotContext::detached(&CancellationToken::new(), 1);
        let value = ctx.run(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn run_refuses_when_already_cancelled() {
        let parent = CancellationToken::new();
        let ctx = SlotContext::detached(&parent, 1);
        parent.cancel();

        let err = ctx.run(async { 42 }).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn run_is_interrupted_by_preemption() {
        let slot = ConcurrencySlot::new();
        let parent = CancellationToken::new();
        let first = slot.use_slot(&parent, 1);

        let pending = tokio::spawn({
            let first = first.clone();
            async move {
                first
                    .run(tokio::time::sleep(Duration::from_secs(60)))
                    .await
            }
        });
        tokio::task::yield_now().await;

        let _second = slot.use_slot(&parent, 1);
        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }
}
