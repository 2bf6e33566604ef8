//! # Actuator Manager
//!
//! Owns one playback session: the shared loop length, the common start anchor,
//! the stop signal and the scheduler threads.
//!
//! ## Session Lifecycle
//! 1. [`ActuatorManager::start`] stops any previous session, compiles a plan per
//!    track and spawns one named thread per track that has notes
//! 2. Every scheduler receives the same `master_start` and the same shared
//!    loop duration, so tracks of different tempo or meter line up again at
//!    each shared loop boundary
//! 3. [`ActuatorManager::stop`] raises the cancellation token; schedulers
//!    notice it within one wait iteration and clean up themselves
//! 4. [`ActuatorManager::join`] collects each thread's outcome
//!
//! One actuator failing never stops the other: the error ends that thread and
//! shows up in [`ActuatorManager::statuses`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Instant;
//! use drumbot_core::driver::SimulatedFactory;
//! use drumbot_core::entrainment::ControllerHandle;
//! use drumbot_core::{ActuatorManager, CalibrationTable, RigConfig, Score, ScoreItem, Track};
//!
//! let config = RigConfig::default();
//! let table = Arc::new(CalibrationTable::empty(1000.0, 1000.0));
//! let mut manager = ActuatorManager::new(config, table, Arc::new(SimulatedFactory::new()))
//!     .with_max_loops(Some(1));
//!
//! let score = Score::single(Track::new(600.0, 4, 4, 1, vec![ScoreItem::note(0.0, 1.0)]));
//! let lead_in = manager.estimate_first_move_preparation_time(&score);
//! assert!(lead_in > 0.0);
//!
//! manager.start(&score, ControllerHandle::passthrough(), Instant::now()).unwrap();
//! let outcomes = manager.join();
//! assert!(outcomes.values().all(|r| r.is_ok()));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{info, warn};

use crate::calibration::CalibrationTable;
use crate::config::RigConfig;
use crate::deadline::{CancellationToken, SessionClock};
use crate::driver::DriverFactory;
use crate::entrainment::ControllerHandle;
use crate::error::DrumbotError;
use crate::events::{CueDispatcher, EventSink};
use crate::motion::{compile_track, StrikeProfile};
use crate::scheduler::{ActuatorScheduler, ActuatorState, SchedulerSettings, StatusBoard};
use crate::score::{self, Score, TrackName};

/// Longest track loop in the score; every scheduler loops on this length.
pub fn shared_loop_duration(score: &Score) -> f64 {
    score
        .tracks()
        .map(|(_, track)| track.loop_duration_s())
        .fold(0.0, f64::max)
}

struct Session {
    token: CancellationToken,
    threads: Vec<(TrackName, JoinHandle<Result<(), DrumbotError>>)>,
    cues: Option<CueDispatcher>,
}

pub struct ActuatorManager {
    config: RigConfig,
    calibration: Arc<CalibrationTable>,
    factory: Arc<dyn DriverFactory>,
    events: EventSink,
    max_loops: Option<usize>,
    status: StatusBoard,
    session: Option<Session>,
}

impl ActuatorManager {
    pub fn new(config: RigConfig, calibration: Arc<CalibrationTable>, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            config,
            calibration,
            factory,
            events: EventSink::none(),
            max_loops: None,
            status: StatusBoard::new(),
            session: None,
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// End each scheduler after this many loops instead of running until stopped.
    pub fn with_max_loops(mut self, loops: Option<usize>) -> Self {
        self.max_loops = loops;
        self
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Start playback anchored at `master_start`.
    ///
    /// Returns the tracks that got a scheduler. Tracks without notes still
    /// count toward the shared loop length but are not spawned.
    pub fn start(
        &mut self,
        score: &Score,
        controller: ControllerHandle,
        master_start: Instant,
    ) -> Result<Vec<TrackName>, DrumbotError> {
        score::validate(score)?;
        if self.session.is_some() {
            info!("stopping previous session");
            self.stop();
            self.join();
        }
        self.status.clear();

        let loop_duration_s = shared_loop_duration(score);
        let policy = self.config.timing.wait_policy();
        let token = CancellationToken::new();

        let cues = if self.config.timing.hit_cue && self.events.is_active() {
            Some(CueDispatcher::spawn(
                self.events.clone(),
                SessionClock::new(master_start),
                token.clone(),
                policy,
            )?)
        } else {
            None
        };
        let cue_sender = cues.as_ref().and_then(|c| c.sender());

        let session = self.session.insert(Session {
            token: token.clone(),
            threads: Vec::new(),
            cues,
        });

        info!(
            loop_duration_s,
            controller = controller.name(),
            single = score.is_single_actuator(),
            "starting session"
        );

        for (name, track) in score.tracks() {
            let profile = StrikeProfile::from_config(&self.config, name);
            let plan = compile_track(name, track, &profile);
            if plan.is_empty() {
                info!(track = %name, "track has no notes; no scheduler spawned");
                continue;
            }

            let scheduler = ActuatorScheduler::new(
                plan,
                SchedulerSettings::from_config(&self.config, name),
                self.calibration.clone(),
                controller.clone(),
                token.clone(),
            )
            .with_loop_duration(loop_duration_s)
            .with_wait_policy(policy)
            .with_events(self.events.clone())
            .with_cues(cue_sender.clone())
            .with_status(self.status.clone())
            .with_max_loops(self.max_loops);

            self.status.set(name, ActuatorState::Idle);
            let driver = self.factory.create(name);
            let spawned = thread::Builder::new()
                .name(format!("actuator-{}", name))
                .spawn(move || scheduler.run(driver, master_start));

            match spawned {
                Ok(handle) => session.threads.push((name, handle)),
                Err(e) => {
                    token.cancel();
                    return Err(e.into());
                }
            }
        }

        Ok(session.threads.iter().map(|(name, _)| *name).collect())
    }

    /// Signal every scheduler to stop. Does not wait.
    pub fn stop(&self) {
        if let Some(session) = &self.session {
            session.token.cancel();
        }
    }

    /// Wait for every scheduler of the current session and collect outcomes.
    pub fn join(&mut self) -> BTreeMap<TrackName, Result<(), DrumbotError>> {
        let mut outcomes = BTreeMap::new();
        let Some(mut session) = self.session.take() else {
            return outcomes;
        };

        for (name, handle) in session.threads.drain(..) {
            let outcome = handle.join().unwrap_or_else(|_| {
                let message = "scheduler thread panicked".to_string();
                self.status.set(name, ActuatorState::Failed(message.clone()));
                Err(DrumbotError::Hardware { track: name, message })
            });
            outcomes.insert(name, outcome);
        }
        if let Some(cues) = session.cues.as_mut() {
            cues.shutdown();
        }
        outcomes
    }

    /// Stop and wait. Schedulers park their arms at the safe pose on the way out.
    pub fn emergency_stop(&mut self) -> BTreeMap<TrackName, Result<(), DrumbotError>> {
        warn!("emergency stop");
        self.stop();
        self.join()
    }

    /// True while any scheduler thread is still running.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.threads.iter().any(|(_, h)| !h.is_finished()))
    }

    pub fn statuses(&self) -> BTreeMap<TrackName, ActuatorState> {
        self.status.snapshot()
    }

    /// Lead-in needed before `master_start` so the first stroke can land on time.
    ///
    /// Uses the top track: the move from the ready pose to its first step, plus
    /// first-hit compensation and communication latency. A score without notes
    /// gets `timing.fallback_preparation_s`.
    pub fn estimate_first_move_preparation_time(&self, score: &Score) -> f64 {
        let timing = &self.config.timing;
        let profile = StrikeProfile::from_config(&self.config, TrackName::Top);
        let plan = compile_track(TrackName::Top, &score.top, &profile);

        let Some(first) = plan.first() else {
            return timing.fallback_preparation_s;
        };
        let move_duration = if first.is_compensated {
            0.0
        } else {
            let distance = profile.safe_ready_pose().distance_to(&first.pose);
            self.calibration.duration_from_distance(distance)
        };
        move_duration + timing.first_hit_compensation_s + timing.communication_latency_s
    }
}

impl Drop for ActuatorManager {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.stop();
            self.join();
        }
    }
}
