//! A shutdown signal that cooperative loops can check between jobs and race
//! against their idle sleep, so a worker blocked on an empty poll wakes
//! immediately instead of waiting out the full interval.
//!
//! `request()` is two-tier: the first call asks a worker to finish its
//! current job and then stop; a second call escalates, waking anything
//! waiting on `escalated()` so an in-flight job can be cancelled rather than
//! run to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Default)]
pub struct Shutdown {
    flag: AtomicBool,
    notify: Notify,
    escalate: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
            escalate: Notify::new(),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown. The first call wakes idle waiters; any call after
    /// that (a repeated signal) escalates and wakes `escalated()` waiters.
    pub fn request(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            self.escalate.notify_waiters();
        } else {
            self.notify.notify_waiters();
        }
    }

    /// Sleep for `dur`, waking early if shutdown is requested in the meantime.
    pub async fn cancellable_sleep(&self, dur: Duration) {
        if self.is_requested() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => {}
            _ = self.notify.notified() => {}
        }
    }

    /// Resolves once a second shutdown request escalates an already-pending one.
    pub async fn escalated(&self) {
        self.escalate.notified().await;
    }
}
