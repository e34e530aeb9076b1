// Dead-man's switch for the robot base
// Note: the robot only moves while commands keep arriving faster than the watchdog
// interval. Lost network, a crashed operator or a pulled cable all end in a stop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, warn};

use crate::motor::Actuator;

/// Something the watchdog can force into a safe state
pub trait FailSafe: Send + 'static {
    fn fail_safe(&mut self);
}

impl FailSafe for Actuator {
    fn fail_safe(&mut self) {
        if let Err(e) = self.stop() {
            error!("Watchdog stop failed: {}", e);
        }
    }
}

/// When the pending timer expires, and which arm() scheduled it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogDeadline {
    pub expires_at: Instant,
    pub generation: u64,
}

struct Guarded<T> {
    target: T,
    deadline: Option<WatchdogDeadline>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    fired: u64,
}

/// Single-shot, re-armable timer guarding `T`.
///
/// The guarded target, the deadline and the pending timer share one mutex,
/// so the command path and a firing timer never touch the target at the
/// same time. A timer only acts if the generation it captured is still
/// current; a rearm in between makes it a no-op.
pub struct SafetyWatchdog<T: FailSafe> {
    shared: Arc<Mutex<Guarded<T>>>,
    interval: Duration,
}

impl<T: FailSafe> Clone for SafetyWatchdog<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            interval: self.interval,
        }
    }
}

fn lock<T>(shared: &Mutex<Guarded<T>>) -> MutexGuard<'_, Guarded<T>> {
    // A panic elsewhere must not keep the fail-safe from running
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: FailSafe> SafetyWatchdog<T> {
    /// Create a disarmed watchdog
    pub fn new(target: T, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Guarded {
                target,
                deadline: None,
                generation: 0,
                timer: None,
                fired: 0,
            })),
            interval,
        }
    }

    /// Schedule a fire at now + interval, superseding any pending one.
    /// Must be called from within a tokio runtime.
    pub fn arm(&self) -> WatchdogDeadline {
        let mut guard = lock(&self.shared);
        self.arm_locked(&mut guard)
    }

    /// Run `f` on the target and rearm if it succeeded, atomically with
    /// respect to a fire. A failed `f` leaves the pending deadline as it was.
    pub fn feed<V, E>(&self, f: impl FnOnce(&mut T) -> Result<V, E>) -> Result<V, E> {
        let mut guard = lock(&self.shared);
        let value = f(&mut guard.target)?;
        self.arm_locked(&mut guard);
        Ok(value)
    }

    /// Run `f` on the target without touching the deadline
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = lock(&self.shared);
        f(&mut guard.target)
    }

    /// Cancel the pending timer, if any
    pub fn disarm(&self) {
        let mut guard = lock(&self.shared);
        guard.generation += 1;
        guard.deadline = None;
        if let Some(timer) = guard.timer.take() {
            timer.abort();
        }
    }

    pub fn deadline(&self) -> Option<WatchdogDeadline> {
        lock(&self.shared).deadline
    }

    /// How many times the watchdog has forced a stop
    pub fn fire_count(&self) -> u64 {
        lock(&self.shared).fired
    }

    fn arm_locked(&self, guard: &mut Guarded<T>) -> WatchdogDeadline {
        guard.generation += 1;
        let deadline = WatchdogDeadline {
            expires_at: Instant::now() + self.interval,
            generation: guard.generation,
        };
        guard.deadline = Some(deadline);

        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let timer = tokio::spawn(async move {
            sleep_until(deadline.expires_at).await;

            let mut guard = lock(&shared);
            if guard.generation != deadline.generation {
                debug!("Stale watchdog timer (generation {})", deadline.generation);
                return;
            }
            guard.deadline = None;
            guard.timer = None;
            guard.fired += 1;
            warn!("[WATCHDOG] No command for {:?} - robot stopped", interval);
            guard.target.fail_safe();
        });

        if let Some(previous) = guard.timer.replace(timer) {
            previous.abort();
        }
        deadline
    }
}
