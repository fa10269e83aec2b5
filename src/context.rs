use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::{ErrorKind, Result};

/// Cancellation and deadline of the request a repository call runs for.
///
/// Clones share the cancellation flag, so the caller keeps one handle and
/// passes another into the repository.
///
/// `cancel` is observed between round trips only: a statement already sent
/// runs to completion and keeps its connection until then. A deadline is
/// also enforced by the database as a `statement_timeout`, so it does stop
/// a running statement.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Context::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Context::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Context {
            deadline: Some(deadline),
            cancelled: Arc::default(),
        }
    }

    /// Makes the next `check` on any clone fail with `Cancelled`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fails with `Cancelled` once the context is cancelled or past its deadline.
    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() || self.remaining() == Some(Duration::from_secs(0)) {
            return Err(ErrorKind::Cancelled(operation).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_expires() {
        let ctx = Context::background();
        assert!(ctx.remaining().is_none());
        assert!(ctx.check("op").is_ok());
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let ctx = Context::background();
        let handed_out = ctx.clone();
        ctx.cancel();

        let err = handed_out.check("get_article").unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn past_deadline_is_cancelled() {
        let ctx = Context::with_deadline(Instant::now() - Duration::from_millis(5));
        assert_eq!(ctx.remaining(), Some(Duration::from_secs(0)));
        assert!(ctx.check("get_tags").unwrap_err().is_cancelled());
    }

    #[test]
    fn future_deadline_leaves_time() {
        let ctx = Context::with_timeout(Duration::from_secs(60));
        assert!(ctx.remaining().unwrap() > Duration::from_secs(30));
        assert!(ctx.check("get_tags").is_ok());
    }
}
