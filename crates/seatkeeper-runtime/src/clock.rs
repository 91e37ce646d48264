//! Clock collaborators for deadline-driven exits.
//!
//! The runtime only needs `now()` and a way to be called back once a
//! deadline passes. [`ManualTimer`] is advanced explicitly (tests, demo);
//! [`WallClockTimer`] counts Unix seconds and sleeps on the tokio runtime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Callback run once with the time at which it fired.
pub type Wakeup = Box<dyn FnOnce(u64) + Send + 'static>;

/// A source of time that can wake callers at a deadline.
pub trait TimerService: Send + Sync + fmt::Debug {
    /// Current time in this timer's units.
    fn now(&self) -> u64;

    /// Run `wakeup` once `now() >= deadline`. Fires immediately if the
    /// deadline has already passed.
    fn set_wakeup(&self, deadline: u64, wakeup: Wakeup);
}

#[derive(Default)]
struct ManualState {
    now: u64,
    pending: Vec<(u64, Wakeup)>,
}

/// A timer that only moves when told to.
#[derive(Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<ManualState>>,
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualTimer")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl ManualTimer {
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: start,
                pending: Vec::new(),
            })),
        }
    }

    /// Advance by one unit and fire whatever came due.
    pub fn tick(&self) -> u64 {
        let next = self.now().saturating_add(1);
        self.advance_to(next);
        next
    }

    /// Move the clock to `time` (never backwards) and fire due wakeups in
    /// deadline order.
    pub fn advance_to(&self, time: u64) {
        let mut due = {
            let mut state = self.state.lock();
            state.now = state.now.max(time);
            let now = state.now;
            let (due, pending): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.pending).into_iter().partition(|(d, _)| *d <= now);
            state.pending = pending;
            due
        };
        due.sort_by_key(|(deadline, _)| *deadline);
        let now = self.now();
        debug!(now, fired = due.len(), "manual timer advanced");
        for (_, wakeup) in due {
            wakeup(now);
        }
    }

    /// Wakeups still waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl TimerService for ManualTimer {
    fn now(&self) -> u64 {
        self.state.lock().now
    }

    fn set_wakeup(&self, deadline: u64, wakeup: Wakeup) {
        let now = {
            let mut state = self.state.lock();
            if deadline > state.now {
                state.pending.push((deadline, wakeup));
                return;
            }
            state.now
        };
        wakeup(now);
    }
}

/// Unix-seconds timer backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClockTimer;

impl WallClockTimer {
    fn unix_now() -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

impl TimerService for WallClockTimer {
    fn now(&self) -> u64 {
        Self::unix_now()
    }

    fn set_wakeup(&self, deadline: u64, wakeup: Wakeup) {
        let now = Self::unix_now();
        if deadline <= now {
            wakeup(now);
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(deadline, "no tokio runtime, wall clock wakeup dropped");
            return;
        };
        handle.spawn(async move {
            tokio::time::sleep(Duration::from_secs(deadline - now)).await;
            wakeup(Self::unix_now().max(deadline));
        });
    }
}
