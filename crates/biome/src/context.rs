//! Cancellation for blocking biome operations.
//!
//! Every command run inside a biome and every container-runtime call takes a
//! [`Context`]. Cleanup actions never inherit the caller's context; they run
//! under [`Context::teardown`] so a canceled or timed-out build still gets
//! its secrets and containers removed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::BiomeError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

/// Cancels every context derived from the one it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Context {
    /// A context that is never done.
    pub fn background() -> Self {
        Self::default()
    }

    /// A fresh, non-cancelable context for cleanup actions.
    ///
    /// Deliberately shares nothing with any operational context.
    pub fn teardown() -> Self {
        Self::background()
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                cancelled: Some(flag.clone()),
                deadline: None,
            },
            CancelHandle(flag),
        )
    }

    /// Derive a context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancelled: self.cancelled.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    pub fn check(&self) -> Result<(), BiomeError> {
        if let Some(flag) = &self.cancelled {
            if flag.load(Ordering::SeqCst) {
                return Err(BiomeError::Canceled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BiomeError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_never_done() {
        assert!(!Context::background().is_done());
    }

    #[test]
    fn cancel_marks_context_and_clones_done() {
        let (ctx, handle) = Context::with_cancel();
        let derived = ctx.with_timeout(Duration::from_secs(60));
        handle.cancel();
        assert!(matches!(ctx.check(), Err(BiomeError::Canceled)));
        assert!(matches!(derived.check(), Err(BiomeError::Canceled)));
    }

    #[test]
    fn teardown_context_ignores_cancelled_parent() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();
        assert!(ctx.is_done());
        assert!(!Context::teardown().is_done());
    }

    #[test]
    fn elapsed_deadline_reports_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::ZERO);
        assert!(matches!(ctx.check(), Err(BiomeError::DeadlineExceeded)));
    }

    #[test]
    fn with_timeout_keeps_earlier_deadline() {
        let short = Context::background().with_timeout(Duration::from_millis(10));
        let long = short.with_timeout(Duration::from_secs(3600));
        assert_eq!(short.deadline(), long.deadline());
    }
}
