//! Motion plan type definitions

use serde::Serialize;

use crate::config::RigConfig;
use crate::pose::{Pose, SafetyBox};
use crate::score::TrackName;

/// What a motion step does to the drum.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MotionAction {
    /// Down onto the drum head; must land on the beat.
    Strike,
    /// Back up to the backswing pose after a strike.
    Upstroke,
}

/// One point-to-point move at a target time within the loop.
///
/// # Fields
/// - `target_time_s`: Ideal time in seconds from the loop start
/// - `pose`: Clamped target pose
/// - `velocity` / `acceleration`: Speed setting for the move
/// - `action`: Strike or Upstroke
/// - `is_compensated`: When true the step is sent at the guided time minus
///   communication latency only; when false the calibrated move duration is
///   subtracted as well so the arm *arrives* on time
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MotionStep {
    pub target_time_s: f64,
    pub pose: Pose,
    pub velocity: f64,
    pub acceleration: f64,
    pub action: MotionAction,
    pub is_compensated: bool,
}

/// The compiled, time-ordered steps for one track.
///
/// Immutable once built; steps are sorted by `target_time_s`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MotionPlan {
    pub track: TrackName,
    pub loop_duration_s: f64,
    steps: Vec<MotionStep>,
}

impl MotionPlan {
    pub(crate) fn new(track: TrackName, loop_duration_s: f64, steps: Vec<MotionStep>) -> Self {
        Self {
            track,
            loop_duration_s,
            steps,
        }
    }

    pub fn steps(&self) -> &[MotionStep] {
        &self.steps
    }

    pub fn first(&self) -> Option<&MotionStep> {
        self.steps.first()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn strike_count(&self) -> usize {
        self.steps.iter().filter(|s| s.action == MotionAction::Strike).count()
    }
}

/// The fixed poses and speed used to turn notes into moves for one actuator.
#[derive(Debug, Clone, PartialEq)]
pub struct StrikeProfile {
    pub ready_pose: Pose,
    pub strike_pose: Pose,
    pub velocity: f64,
    pub acceleration: f64,
    pub upstroke_delay_s: f64,
    pub backswing_height_mm: f64,
    pub safety: SafetyBox,
}

impl StrikeProfile {
    pub fn from_config(config: &RigConfig, track: TrackName) -> Self {
        let actuator = config.actuators.get(track);
        Self {
            ready_pose: actuator.ready_pose,
            strike_pose: actuator.strike_pose,
            velocity: config.motion.velocity,
            acceleration: config.motion.acceleration,
            upstroke_delay_s: config.motion.upstroke_delay_s,
            backswing_height_mm: config.motion.backswing_height_mm,
            safety: config.safety,
        }
    }

    /// Ready pose after the safety clamp.
    pub fn safe_ready_pose(&self) -> Pose {
        self.safety.clamp(self.ready_pose)
    }

    /// Strike pose after the safety clamp.
    pub fn safe_strike_pose(&self) -> Pose {
        self.safety.clamp(self.strike_pose)
    }

    /// Backswing pose: above the strike by `backswing_height_mm`, but never
    /// above the safety ceiling, at the ready pose's x/y/r.
    pub fn backswing_pose(&self) -> Pose {
        let strike_z = self.safe_strike_pose().z;
        let headroom = (self.safety.z_max - strike_z).max(0.0);
        let lift = self.backswing_height_mm.min(headroom);
        let ready = self.safe_ready_pose();
        self.safety.clamp(ready.with_z(strike_z + lift))
    }
}
