//! Cancellation and deadlines for a planning pass

use crate::error::CancelReason;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Carries the caller's cancellation signal and deadline into a pass.
///
/// Cloning is cheap; clones observe the same signal.
#[derive(Debug, Clone)]
pub struct PlanContext {
    cancelled: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every [`PlanContext`] created alongside it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl PlanContext {
    /// Never cancelled, no deadline.
    pub fn background() -> Self {
        Self {
            cancelled: None,
            deadline: None,
        }
    }

    /// A context plus the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancelled: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Same signal, deadline `timeout` from now (or the existing one if
    /// earlier). A timeout too large to represent adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Err` once the pass must stop.
    pub fn check(&self) -> Result<(), CancelReason> {
        if let Some(rx) = &self.cancelled {
            if *rx.borrow() {
                return Err(CancelReason::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(CancelReason::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

impl Default for PlanContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_stops() {
        assert_eq!(PlanContext::background().check(), Ok(()));
    }

    #[test]
    fn test_cancel_reaches_clones() {
        let (ctx, handle) = PlanContext::cancellable();
        let clone = ctx.clone();
        assert_eq!(clone.check(), Ok(()));

        handle.cancel();
        assert_eq!(ctx.check(), Err(CancelReason::Cancelled));
        assert_eq!(clone.check(), Err(CancelReason::Cancelled));
    }

    #[test]
    fn test_cancel_after_handle_dropped_state_is_kept() {
        let (ctx, handle) = PlanContext::cancellable();
        handle.cancel();
        drop(handle);
        assert_eq!(ctx.check(), Err(CancelReason::Cancelled));
    }

    #[test]
    fn test_deadline() {
        let expired = PlanContext::background().with_deadline(Instant::now());
        assert_eq!(expired.check(), Err(CancelReason::DeadlineExceeded));

        let later = PlanContext::background().with_timeout(Duration::from_secs(60));
        assert_eq!(later.check(), Ok(()));

        let earliest = later.with_deadline(Instant::now());
        assert_eq!(earliest.check(), Err(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn test_unrepresentable_timeout_adds_no_deadline() {
        let ctx = PlanContext::background().with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.check(), Ok(()));

        let bounded = PlanContext::background()
            .with_timeout(Duration::from_secs(60))
            .with_timeout(Duration::MAX);
        assert!(bounded.deadline().is_some());
    }
}
