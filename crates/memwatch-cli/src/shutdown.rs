//! Ctrl+C handling for the polling loop.
//!
//! The watch command sleeps between polls and between reattach attempts.
//! Both sleeps go through [`ShutdownSignal::wait`] so a Ctrl+C ends them at
//! once instead of after a full interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Stop flag whose waits wake up as soon as it is triggered.
///
/// The flag is sticky: once triggered every later `wait` returns `true`
/// without blocking. It is shared between the `ctrlc` handler thread and
/// the poll loop through an `Arc`.
pub struct ShutdownSignal {
    shutdown: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl ShutdownSignal {
    /// A signal that has not been triggered.
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Set the flag and wake every thread blocked in [`wait`](Self::wait).
    /// Safe to call more than once.
    pub fn trigger(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Take the lock so a waiter cannot miss the notification between
        // its check and its wait.
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    /// Non-blocking check, used at the top of each reattach attempt.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless triggered first.
    ///
    /// Returns `true` when shutdown was triggered, before or during the
    /// wait, and `false` when the full duration elapsed. A poisoned lock
    /// counts as a shutdown so the caller still exits its loop.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }

        let Ok(guard) = self.mutex.lock() else {
            // Mutex poisoned, treat as shutdown
            return true;
        };
        match self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.is_shutdown())
        {
            Ok((_, timeout)) => !timeout.timed_out(),
            Err(_) => true,
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait(Duration::from_millis(10)));
        assert!(!signal.is_shutdown());
    }

    #[test]
    fn test_wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        assert!(signal.is_shutdown());
        assert!(signal.wait(Duration::from_secs(60)));
    }

    #[test]
    fn test_trigger_interrupts_wait() {
        let signal = Arc::new(ShutdownSignal::new());
        let trigger = Arc::clone(&signal);

        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        assert!(signal.wait(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
    }

    #[test]
    fn test_trigger_wakes_every_waiter() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = Arc::clone(&signal);
                thread::spawn(move || signal.wait(Duration::from_secs(30)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        signal.trigger();
        signal.trigger();

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
        assert!(signal.wait(Duration::from_secs(30)));
    }
}
