//! # Entrainment Module
//!
//! Decides, per beat, what "now" should mean for the performer.
//!
//! ## Purpose
//! The scheduler asks the controller for a *guided* time for every motion
//! step. Controllers move that time away from the score by a per-track offset
//! learned from the performer's measured timing errors, so the robot leans
//! toward where the human actually is and then gradually pulls them back.
//!
//! ## Sub-modules
//! - `judgement` - Judgement history handed over by the hit-detection side
//! - `state` - Offsets, loop counters and loop summaries
//! - `passthrough` - Score as written
//! - `linear` - Re-measured offset every loop, decays without input
//! - `staged` - Collect, establish, intervene, converge, repeat
//!
//! ## Concurrency
//! Schedulers read the controller mid-loop while the judgement feed updates it
//! between loops. [`ControllerHandle`] wraps the controller in a
//! `parking_lot::RwLock`: readers share, the single writer is exclusive.
//!
//! ## Example
//! ```rust
//! use drumbot_core::entrainment::{ControllerHandle, Judgement, JudgementKind};
//! use drumbot_core::{ControllerConfig, TrackName};
//!
//! let handle = ControllerHandle::from_config(&ControllerConfig::from_kind("linear").unwrap());
//! let mut history = Vec::new();
//! for _ in 0..3 {
//!     history.push(vec![Judgement::hit(TrackName::Top, 40.0, JudgementKind::Good)]);
//!     handle.update_performance_data(&history);
//! }
//!
//! let timing = handle.guided_timing(TrackName::Top, 1000.0);
//! assert!((timing.time_ms - 1036.0).abs() < 1e-9);
//! ```

mod judgement;
mod linear;
mod passthrough;
mod staged;
mod state;

#[cfg(test)]
mod tests;

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::ControllerConfig;
use crate::score::TrackName;

pub use judgement::{
    errors_for, history_from_json, loop_from_json, mean, Judgement, JudgementKind, LoopJudgements,
};
pub use linear::LinearCorrector;
pub use passthrough::Passthrough;
pub use staged::{StagedCorrector, StagedPhase};
pub use state::{EntrainmentState, LoopSummary, TrackLoopStats, TrackOffsets, HISTORY_CAPACITY};

/// Result of asking a controller where a note should land.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidedTiming {
    pub time_ms: f64,
    /// Present only when the controller changed the time.
    pub log: Option<String>,
}

impl GuidedTiming {
    pub fn unchanged(ideal_ms: f64) -> Self {
        Self {
            time_ms: ideal_ms,
            log: None,
        }
    }
}

/// Capability shared by every controller strategy.
pub trait Entrainment {
    fn name(&self) -> &'static str;

    /// Map an ideal in-loop time (ms from loop start) to a guided one.
    fn guided_timing(&self, track: TrackName, ideal_ms: f64) -> GuidedTiming;

    /// Called once per completed loop with the full history so far.
    fn update_performance_data(&mut self, history: &[LoopJudgements]) -> Option<String>;

    fn reset(&mut self);

    fn state(&self) -> EntrainmentState;
}

/// The closed set of controller strategies.
#[derive(Debug, Clone)]
pub enum EntrainmentController {
    Passthrough(Passthrough),
    Linear(LinearCorrector),
    Staged(StagedCorrector),
}

impl EntrainmentController {
    pub fn from_config(config: &ControllerConfig) -> Self {
        match config {
            ControllerConfig::Passthrough => EntrainmentController::Passthrough(Passthrough),
            ControllerConfig::Linear(c) => EntrainmentController::Linear(LinearCorrector::new(c.clone())),
            ControllerConfig::Staged(c) => EntrainmentController::Staged(StagedCorrector::new(c.clone())),
        }
    }

    fn inner(&self) -> &dyn Entrainment {
        match self {
            EntrainmentController::Passthrough(c) => c,
            EntrainmentController::Linear(c) => c,
            EntrainmentController::Staged(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Entrainment {
        match self {
            EntrainmentController::Passthrough(c) => c,
            EntrainmentController::Linear(c) => c,
            EntrainmentController::Staged(c) => c,
        }
    }
}

impl Entrainment for EntrainmentController {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn guided_timing(&self, track: TrackName, ideal_ms: f64) -> GuidedTiming {
        self.inner().guided_timing(track, ideal_ms)
    }

    fn update_performance_data(&mut self, history: &[LoopJudgements]) -> Option<String> {
        self.inner_mut().update_performance_data(history)
    }

    fn reset(&mut self) {
        self.inner_mut().reset()
    }

    fn state(&self) -> EntrainmentState {
        self.inner().state()
    }
}

/// Shared, thread-safe controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    inner: Arc<RwLock<EntrainmentController>>,
}

impl ControllerHandle {
    pub fn new(controller: EntrainmentController) -> Self {
        Self {
            inner: Arc::new(RwLock::new(controller)),
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(EntrainmentController::from_config(config))
    }

    pub fn passthrough() -> Self {
        Self::new(EntrainmentController::Passthrough(Passthrough))
    }

    pub fn name(&self) -> &'static str {
        self.inner.read().name()
    }

    pub fn guided_timing(&self, track: TrackName, ideal_ms: f64) -> GuidedTiming {
        self.inner.read().guided_timing(track, ideal_ms)
    }

    pub fn update_performance_data(&self, history: &[LoopJudgements]) -> Option<String> {
        self.inner.write().update_performance_data(history)
    }

    pub fn reset(&self) {
        self.inner.write().reset()
    }

    pub fn snapshot(&self) -> EntrainmentState {
        self.inner.read().state()
    }
}

impl Default for ControllerHandle {
    fn default() -> Self {
        Self::passthrough()
    }
}
