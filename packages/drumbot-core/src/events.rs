//! Observability events and the hit-cue dispatcher.
//!
//! Schedulers never render anything. They publish [`SchedulerEvent`]s to an
//! optional `crossbeam_channel` sender and a visualizer or logger on the other
//! end decides what to do with them. All times are seconds relative to the
//! session's master start.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;

use crate::deadline::{wait_until, CancellationToken, SessionClock, WaitOutcome, WaitPolicy};
use crate::error::DrumbotError;
use crate::motion::MotionStep;
use crate::scheduler::ActuatorState;
use crate::score::TrackName;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SchedulerEvent {
    StateChanged {
        track: TrackName,
        state: ActuatorState,
    },
    CommandIssued {
        track: TrackName,
        loop_index: usize,
        step: MotionStep,
    },
    /// Expected physical arrival of a distance-compensated move.
    EstimatedArrival {
        track: TrackName,
        time_s: f64,
        pose_height: f64,
    },
    ControllerLog {
        track: TrackName,
        message: String,
    },
    /// Moment an audible or visual strike cue should fire.
    HitCue {
        track: TrackName,
        time_s: f64,
    },
}

impl SchedulerEvent {
    pub fn track(&self) -> TrackName {
        match self {
            SchedulerEvent::StateChanged { track, .. }
            | SchedulerEvent::CommandIssued { track, .. }
            | SchedulerEvent::EstimatedArrival { track, .. }
            | SchedulerEvent::ControllerLog { track, .. }
            | SchedulerEvent::HitCue { track, .. } => *track,
        }
    }
}

/// Where events go. A sink without a sender drops everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<SchedulerEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<SchedulerEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.tx {
            // A receiver that hung up just stops listening.
            let _ = tx.send(event);
        }
    }

    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }
}

/// Requests cues from the dispatcher thread.
#[derive(Debug, Clone)]
pub struct CueSender {
    tx: Sender<(Instant, TrackName)>,
}

impl CueSender {
    pub fn schedule(&self, track: TrackName, at: Instant) {
        let _ = self.tx.send((at, track));
    }
}

/// Single thread that fires [`SchedulerEvent::HitCue`] at requested instants.
///
/// Requests may arrive out of order from different tracks; they are kept in a
/// min-heap and each is released through [`wait_until`].
pub struct CueDispatcher {
    sender: Option<CueSender>,
    handle: Option<JoinHandle<()>>,
}

impl CueDispatcher {
    pub fn spawn(
        sink: EventSink,
        clock: SessionClock,
        token: CancellationToken,
        policy: WaitPolicy,
    ) -> Result<Self, DrumbotError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("hit-cues".to_string())
            .spawn(move || dispatch(rx, sink, clock, token, policy))?;
        Ok(Self {
            sender: Some(CueSender { tx }),
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Option<CueSender> {
        self.sender.clone()
    }

    /// Deliver what is still pending (unless cancelled) and stop.
    pub fn shutdown(&mut self) {
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CueDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(
    rx: Receiver<(Instant, TrackName)>,
    sink: EventSink,
    clock: SessionClock,
    token: CancellationToken,
    policy: WaitPolicy,
) {
    let mut pending: BinaryHeap<Reverse<(Instant, TrackName)>> = BinaryHeap::new();
    let mut open = true;

    while !token.is_cancelled() {
        while let Ok(cue) = rx.try_recv() {
            pending.push(Reverse(cue));
        }

        let Some(&Reverse((due, track))) = pending.peek() else {
            if !open {
                return;
            }
            match rx.recv_timeout(policy.coarse_tick) {
                Ok(cue) => pending.push(Reverse(cue)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => open = false,
            }
            continue;
        };

        let remaining = due.saturating_duration_since(Instant::now());
        if remaining > policy.coarse_margin && open {
            // Stay responsive to earlier cues while the next one is far off.
            let nap = (remaining - policy.coarse_margin).min(policy.coarse_tick);
            match rx.recv_timeout(nap) {
                Ok(cue) => pending.push(Reverse(cue)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => open = false,
            }
            continue;
        }

        if wait_until(due, &token, &policy) == WaitOutcome::Cancelled {
            return;
        }
        pending.pop();
        let time_s = clock.seconds_of(due);
        debug!(track = %track, time_s, "hit cue");
        sink.emit(SchedulerEvent::HitCue { track, time_s });
    }
}
