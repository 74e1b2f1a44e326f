// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deferred actions for idle locking, run on a shared tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;

/// Schedules one-shot callbacks after a delay.
///
/// Built without a runtime the scheduler is disabled: nothing is scheduled
/// and stores never lock themselves.
#[derive(Debug, Clone, Default)]
pub struct IdleScheduler {
    handle: Option<Handle>,
}

static DISABLED_NOTICE: AtomicBool = AtomicBool::new(false);

impl IdleScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Use the runtime the caller is running on, if any.
    pub fn current() -> Self {
        Self {
            handle: Handle::try_current().ok(),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    /// Run `action` after `delay`. Abort the returned handle to cancel.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> Option<AbortHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(handle) = &self.handle else {
            if !DISABLED_NOTICE.swap(true, Ordering::Relaxed) {
                debug!("no runtime for idle timers; stores will not auto-lock");
            }
            return None;
        };
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        Some(task.abort_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let scheduler = IdleScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        scheduler.schedule(Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_action_never_runs() {
        let scheduler = IdleScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = scheduler
            .schedule(Duration::from_secs(5), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        handle.abort();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disabled_scheduler_schedules_nothing() {
        let scheduler = IdleScheduler::disabled();
        assert!(!scheduler.is_enabled());
        assert!(scheduler.schedule(Duration::from_secs(1), || {}).is_none());
    }
}
