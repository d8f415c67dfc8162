//! Cooperative cancellation shared through every recursive planner and
//! executor call.
//!
//! Built on [`tokio_util::sync::CancellationToken`] rather than a bare
//! `AtomicBool` flag (contrast `mofa_kernel::core::interrupt::AgentInterrupt`)
//! because the planner and executor both need to *race* an awaited hook
//! against the trigger, not just poll a flag between steps.

use std::sync::Arc;
use std::sync::RwLock;

use tokio_util::sync::CancellationToken;

/// A cancellation handle threaded through planner/executor recursion.
///
/// Cloning is cheap and shares the same underlying token and reason slot;
/// triggering any clone cancels every other clone derived from it.
#[derive(Clone, Debug)]
pub struct Cancellation {
    token: CancellationToken,
    reason: Arc<RwLock<Option<String>>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(RwLock::new(None)),
        }
    }

    /// Trip the token. The first call wins the reason; later calls are
    /// no-ops beyond re-cancelling an already-cancelled token.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.write().expect("cancellation reason lock poisoned");
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason passed to the winning `cancel()` call, if any.
    pub fn reason(&self) -> Option<String> {
        self.reason.read().expect("cancellation reason lock poisoned").clone()
    }

    fn reason_or_default(&self) -> String {
        self.reason().unwrap_or_else(|| "cancelled".to_string())
    }

    /// Check the token at the entry of a recursive call and bail
    /// immediately if it has already been tripped.
    pub fn check(&self) -> Result<(), String> {
        if self.is_cancelled() {
            Err(self.reason_or_default())
        } else {
            Ok(())
        }
    }

    /// Race `fut` against the token. If the token fires first, `fut`'s
    /// eventual resolution is discarded and this resolves with the
    /// cancellation reason.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, String>
    where
        F: std::future::Future<Output = T>,
    {
        match self.token.run_until_cancelled(fut).await {
            Some(value) => Ok(value),
            None => Err(self.reason_or_default()),
        }
    }
}
