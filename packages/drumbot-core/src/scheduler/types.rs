//! Scheduler state and settings

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::RigConfig;
use crate::pose::{Pose, SafetyBox};
use crate::score::TrackName;

/// Lifecycle of one actuator.
///
/// ```text
/// Idle -> Connecting -> Ready -> WaitingForStart -> Looping{0..} -> CleaningUp -> Terminated
///                  \______________________________________/
///                              error -> CleaningUp -> Failed
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActuatorState {
    Idle,
    Connecting,
    Ready,
    WaitingForStart,
    Looping {
        #[serde(rename = "loopIndex")]
        loop_index: usize,
    },
    CleaningUp,
    Terminated,
    Failed(String),
}

impl ActuatorState {
    /// True once the scheduler thread has finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, ActuatorState::Terminated | ActuatorState::Failed(_))
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorState::Idle => write!(f, "idle"),
            ActuatorState::Connecting => write!(f, "connecting"),
            ActuatorState::Ready => write!(f, "ready"),
            ActuatorState::WaitingForStart => write!(f, "waiting for start"),
            ActuatorState::Looping { loop_index } => write!(f, "looping (loop {})", loop_index),
            ActuatorState::CleaningUp => write!(f, "cleaning up"),
            ActuatorState::Terminated => write!(f, "terminated"),
            ActuatorState::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

/// Latest state of every actuator in a session.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    states: Arc<RwLock<BTreeMap<TrackName, ActuatorState>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, track: TrackName, state: ActuatorState) {
        self.states.write().insert(track, state);
    }

    pub fn get(&self, track: TrackName) -> Option<ActuatorState> {
        self.states.read().get(&track).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<TrackName, ActuatorState> {
        self.states.read().clone()
    }

    pub fn clear(&self) {
        self.states.write().clear();
    }
}

/// Everything a scheduler needs from the rig file, resolved for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub port: String,
    pub ready_pose: Pose,
    pub safe_pose: Pose,
    pub ready_velocity: f64,
    pub ready_acceleration: f64,
    pub safety: SafetyBox,
    pub communication_latency_s: f64,
    pub first_hit_compensation_s: f64,
    pub hit_cue_offset_s: f64,
}

impl SchedulerSettings {
    pub fn from_config(config: &RigConfig, track: TrackName) -> Self {
        let actuator = config.actuators.get(track);
        Self {
            port: config.actuators.port(track),
            ready_pose: actuator.ready_pose,
            safe_pose: actuator.safe_pose,
            ready_velocity: config.motion.ready_velocity,
            ready_acceleration: config.motion.ready_acceleration,
            safety: config.safety,
            communication_latency_s: config.timing.communication_latency_s,
            first_hit_compensation_s: config.timing.first_hit_compensation_s,
            hit_cue_offset_s: config.timing.hit_cue_offset_s,
        }
    }
}
