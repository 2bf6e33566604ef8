//! # Deadline Wait
//!
//! Sub-millisecond waiting on a general-purpose OS scheduler.
//!
//! `thread::sleep` overshoots by up to a scheduler quantum, which is audible
//! when a drum stroke lands late. [`wait_until`] therefore sleeps in coarse
//! ticks while the deadline is far away and switches to short polls for the
//! last few milliseconds. The polling phase costs CPU on one core per actuator
//! for roughly `coarse_margin` per command.
//!
//! Cancellation is cooperative: the [`CancellationToken`] is checked on every
//! iteration of both phases, so stop latency is one coarse tick at worst and one
//! fine poll near a deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared stop flag. Any holder may cancel; every holder polls.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How to split a wait between sleeping and polling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    /// Stop sleeping once this much time remains.
    pub coarse_margin: Duration,
    /// Longest single sleep.
    pub coarse_tick: Duration,
    /// Sleep between polls in the fine phase.
    pub fine_poll: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            coarse_margin: Duration::from_millis(10),
            coarse_tick: Duration::from_millis(20),
            fine_poll: Duration::from_micros(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The deadline passed (or had already passed on entry).
    Reached,
    Cancelled,
}

/// Block until `deadline` or until `token` is cancelled.
pub fn wait_until(deadline: Instant, token: &CancellationToken, policy: &WaitPolicy) -> WaitOutcome {
    loop {
        if token.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::Reached;
        }
        let remaining = deadline - now;
        if remaining > policy.coarse_margin {
            let nap = (remaining - policy.coarse_margin).min(policy.coarse_tick);
            thread::sleep(nap);
        } else if remaining > policy.fine_poll {
            thread::sleep(policy.fine_poll);
        } else {
            std::hint::spin_loop();
        }
    }
}

/// Maps session-relative seconds to `Instant`s around a fixed origin.
///
/// Target times may fall slightly before the origin (the first-hit
/// compensation pulls the first strokes earlier), so offsets are signed.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn new(origin: Instant) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn instant_at(&self, seconds: f64) -> Instant {
        if seconds >= 0.0 {
            self.origin + Duration::from_secs_f64(seconds)
        } else {
            let back = Duration::from_secs_f64(-seconds);
            self.origin.checked_sub(back).unwrap_or(self.origin)
        }
    }

    /// Seconds since the origin (negative before it).
    pub fn now_s(&self) -> f64 {
        self.seconds_of(Instant::now())
    }

    pub fn seconds_of(&self, instant: Instant) -> f64 {
        if instant >= self.origin {
            (instant - self.origin).as_secs_f64()
        } else {
            -(self.origin - instant).as_secs_f64()
        }
    }
}
