//! # Practice Session
//!
//! Ties one [`ActuatorManager`] to one entrainment controller and the
//! judgement history fed back by the hit-detection side.
//!
//! ## Lifecycle
//! 1. [`PracticeSession::start`] resets the controller and history, then
//!    anchors playback `lead_in` seconds in the future
//! 2. After every completed loop the caller passes that loop's judgements to
//!    [`PracticeSession::feed_loop`]; the controller sees the full history
//! 3. [`PracticeSession::stop`] / [`PracticeSession::join`] end playback
//!
//! The schedulers read the controller through the same
//! [`ControllerHandle`], so a correction made by `feed_loop` applies from the
//! next step they send.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use tracing::{debug, info};

use drumbot_core::driver::DriverFactory;
use drumbot_core::entrainment::{LoopJudgements, TrackOffsets};
use drumbot_core::{
    ActuatorManager, ActuatorState, ControllerConfig, ControllerHandle, DrumbotError, Entrainment,
    EntrainmentController, RigConfig, Score, TrackName,
};

use crate::error::SessionError;

pub struct PracticeSession {
    manager: ActuatorManager,
    controller: ControllerHandle,
    history: Vec<LoopJudgements>,
}

impl PracticeSession {
    /// Wrap a manager, using the controller named in its rig config.
    pub fn new(manager: ActuatorManager) -> Self {
        let controller = ControllerHandle::from_config(&manager.config().controller);
        Self {
            manager,
            controller,
            history: Vec::new(),
        }
    }

    /// Build a manager from a rig config, loading its calibration table.
    pub fn from_config(config: RigConfig, factory: Arc<dyn DriverFactory>) -> Result<Self, SessionError> {
        let calibration = Arc::new(drumbot_core::load_calibration(&config)?);
        Ok(Self::new(ActuatorManager::new(config, calibration, factory)))
    }

    /// Replace the controller strategy. Takes effect from the next `start`.
    pub fn with_controller(mut self, config: &ControllerConfig) -> Self {
        self.controller = ControllerHandle::from_config(config);
        self
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    pub fn manager(&self) -> &ActuatorManager {
        &self.manager
    }

    pub fn history(&self) -> &[LoopJudgements] {
        &self.history
    }

    /// Lead-in the first stroke needs; see
    /// [`ActuatorManager::estimate_first_move_preparation_time`].
    pub fn lead_in_s(&self, score: &Score) -> f64 {
        self.manager.estimate_first_move_preparation_time(score)
    }

    /// Start playing `score`. Without an explicit lead-in the estimated
    /// preparation time is used. Returns the shared start instant.
    pub fn start(&mut self, score: &Score, lead_in_s: Option<f64>) -> Result<Instant, SessionError> {
        let lead_in = lead_in_s.unwrap_or_else(|| self.lead_in_s(score));
        let lead_in = if lead_in.is_finite() { lead_in.max(0.0) } else { 0.0 };

        self.reset_practice();
        let master_start = Instant::now() + Duration::from_secs_f64(lead_in);
        let tracks = self.manager.start(score, self.controller.clone(), master_start)?;
        info!(
            lead_in_s = lead_in,
            tracks = ?tracks,
            controller = self.controller.name(),
            "practice started"
        );
        Ok(master_start)
    }

    /// Record one completed loop and let the controller react to the full history.
    pub fn feed_loop(&mut self, judgements: LoopJudgements) -> Option<String> {
        self.history.push(judgements);
        let log = self.controller.update_performance_data(&self.history);
        if let Some(message) = &log {
            debug!(loop_index = self.history.len() - 1, "{}", message);
        }
        log
    }

    /// Forget the judgement history and the controller's offsets.
    pub fn reset_practice(&mut self) {
        self.history.clear();
        self.controller.reset();
    }

    pub fn stop(&self) {
        self.manager.stop();
    }

    pub fn join(&mut self) -> BTreeMap<TrackName, Result<(), DrumbotError>> {
        self.manager.join()
    }

    pub fn emergency_stop(&mut self) -> BTreeMap<TrackName, Result<(), DrumbotError>> {
        self.manager.emergency_stop()
    }

    pub fn is_running(&self) -> bool {
        self.manager.is_running()
    }

    pub fn statuses(&self) -> BTreeMap<TrackName, ActuatorState> {
        self.manager.statuses()
    }
}

/// Judgement loops arriving from another thread, polled by the session's
/// supervising loop.
///
/// Once the sending side hangs up the feed closes and [`JudgementFeed::next`]
/// turns into a plain sleep, so the caller keeps its polling rate.
pub struct JudgementFeed {
    rx: Option<Receiver<LoopJudgements>>,
}

impl JudgementFeed {
    pub fn new(rx: Receiver<LoopJudgements>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A feed that never yields.
    pub fn closed() -> Self {
        Self { rx: None }
    }

    pub fn is_open(&self) -> bool {
        self.rx.is_some()
    }

    /// Wait up to `timeout` for the next loop.
    pub fn next(&mut self, timeout: Duration) -> Option<LoopJudgements> {
        let Some(rx) = &self.rx else {
            thread::sleep(timeout);
            return None;
        };
        match rx.recv_timeout(timeout) {
            Ok(judgements) => Some(judgements),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("judgement feed closed");
                self.rx = None;
                thread::sleep(timeout);
                None
            }
        }
    }
}

/// Controller output after one loop of a replayed history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    pub loop_index: usize,
    pub log: Option<String>,
    pub offsets_ms: TrackOffsets,
    pub intervention_active: bool,
}

/// Run a fresh controller over a recorded history, one loop at a time.
pub fn replay_history(config: &ControllerConfig, history: &[LoopJudgements]) -> Vec<ReplayStep> {
    let mut controller = EntrainmentController::from_config(config);
    (1..=history.len())
        .map(|n| {
            let log = controller.update_performance_data(&history[..n]);
            let state = controller.state();
            ReplayStep {
                loop_index: n - 1,
                log,
                offsets_ms: state.offsets_ms,
                intervention_active: state.intervention_active,
            }
        })
        .collect()
}
