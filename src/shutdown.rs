//! Cooperative shutdown signaling
//!
//! A single cancellation token is threaded through the run instead of a
//! process-global flag. Phases poll it at their suspension points; probes
//! already in flight are abandoned, never aborted mid-call.

use tokio_util::sync::CancellationToken;

/// Exit code for an interrupted run (128 + SIGINT)
const INTERRUPT_EXIT_CODE: i32 = 130;

/// Shared cancellation handle for one run
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Spawn the Ctrl-C watcher.
    ///
    /// The first signal cancels the token so phases can stand down and
    /// the run exits without persisting partial results. A second signal
    /// during teardown terminates the process immediately.
    pub fn install_ctrl_c_handler(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            token.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(INTERRUPT_EXIT_CODE);
            }
        });
    }

    /// Trigger cancellation programmatically
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_uncancelled() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn test_cancel_is_sticky_and_shared() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        shutdown.cancel();
        assert!(shutdown.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        shutdown.cancel();
        // must not hang
        waiter.cancelled().await;
    }
}
