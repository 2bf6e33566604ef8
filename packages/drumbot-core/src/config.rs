//! # Rig Configuration
//!
//! Hardware-specific constants for one drum rig, loaded from YAML.
//!
//! Every field carries a serde default, so an empty document (or no file at
//! all) yields the values the original two-arm rig was tuned with. The timing
//! constants here (first-hit compensation, communication latency, backswing
//! height) were measured on specific hardware; they are configuration, not
//! properties of the algorithm.
//!
//! ## Example
//! ```rust
//! use drumbot_core::{RigConfig, ControllerConfig};
//!
//! let config = RigConfig::from_yaml(r#"
//! timing:
//!   communication_latency_s: 0.03
//! controller:
//!   kind: linear
//!   correction_rate: 0.2
//! "#)?;
//!
//! assert_eq!(config.timing.communication_latency_s, 0.03);
//! assert_eq!(config.timing.first_hit_compensation_s, 0.4);
//! assert!(matches!(config.controller, ControllerConfig::Linear(_)));
//! # Ok::<(), drumbot_core::DrumbotError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::deadline::WaitPolicy;
use crate::error::DrumbotError;
use crate::pose::{Pose, SafetyBox};
use crate::score::TrackName;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub actuators: ActuatorsConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub safety: SafetyBox,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl RigConfig {
    pub fn from_yaml(source: &str) -> Result<Self, DrumbotError> {
        let config: RigConfig =
            serde_yaml::from_str(source).map_err(|e| DrumbotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, DrumbotError> {
        let source = fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    pub fn to_yaml(&self) -> Result<String, DrumbotError> {
        serde_yaml::to_string(self).map_err(|e| DrumbotError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), DrumbotError> {
        if !self.safety.is_well_formed() {
            return Err(DrumbotError::Config("safety box has min > max".to_string()));
        }
        self.motion.validate()?;
        self.timing.validate()?;
        self.controller.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Serial port. When absent the track's conventional port is used.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "ActuatorConfig::default_ready_pose")]
    pub ready_pose: Pose,
    #[serde(default = "ActuatorConfig::default_strike_pose")]
    pub strike_pose: Pose,
    /// Where cleanup parks the arm before disconnecting.
    #[serde(default = "ActuatorConfig::default_safe_pose")]
    pub safe_pose: Pose,
}

impl ActuatorConfig {
    fn default_ready_pose() -> Pose {
        Pose::new(230.0, 0.0, 60.0, 0.0)
    }
    fn default_strike_pose() -> Pose {
        Pose::new(226.0, 0.3, 41.0, 0.0)
    }
    fn default_safe_pose() -> Pose {
        Pose::new(230.0, 0.0, 60.0, 0.0)
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            port: None,
            ready_pose: Self::default_ready_pose(),
            strike_pose: Self::default_strike_pose(),
            safe_pose: Self::default_safe_pose(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActuatorsConfig {
    #[serde(default)]
    pub top: ActuatorConfig,
    #[serde(default)]
    pub bottom: ActuatorConfig,
}

impl ActuatorsConfig {
    pub fn get(&self, track: TrackName) -> &ActuatorConfig {
        match track {
            TrackName::Top => &self.top,
            TrackName::Bottom => &self.bottom,
        }
    }

    pub fn port(&self, track: TrackName) -> String {
        self.get(track).port.clone().unwrap_or_else(|| {
            match track {
                TrackName::Top => "COM4",
                TrackName::Bottom => "COM3",
            }
            .to_string()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Velocity for every planned move. The calibration table is filtered to this value.
    #[serde(default = "MotionConfig::default_velocity")]
    pub velocity: f64,
    #[serde(default = "MotionConfig::default_acceleration")]
    pub acceleration: f64,
    /// Gentler speed for the blocking move to the ready pose.
    #[serde(default = "MotionConfig::default_ready_velocity")]
    pub ready_velocity: f64,
    #[serde(default = "MotionConfig::default_ready_acceleration")]
    pub ready_acceleration: f64,
    #[serde(default = "MotionConfig::default_upstroke_delay_s")]
    pub upstroke_delay_s: f64,
    /// Backswing height above the strike pose, before clamping to the safety box.
    #[serde(default = "MotionConfig::default_backswing_height_mm")]
    pub backswing_height_mm: f64,
}

impl MotionConfig {
    fn default_velocity() -> f64 {
        1000.0
    }
    fn default_acceleration() -> f64 {
        1000.0
    }
    fn default_ready_velocity() -> f64 {
        200.0
    }
    fn default_ready_acceleration() -> f64 {
        200.0
    }
    fn default_upstroke_delay_s() -> f64 {
        0.01
    }
    fn default_backswing_height_mm() -> f64 {
        35.0
    }

    fn validate(&self) -> Result<(), DrumbotError> {
        for (name, value) in [
            ("motion.velocity", self.velocity),
            ("motion.acceleration", self.acceleration),
            ("motion.ready_velocity", self.ready_velocity),
            ("motion.ready_acceleration", self.ready_acceleration),
        ] {
            if !(value > 0.0) {
                return Err(DrumbotError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        if self.upstroke_delay_s < 0.0 || self.backswing_height_mm < 0.0 {
            return Err(DrumbotError::Config(
                "motion.upstroke_delay_s and motion.backswing_height_mm must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            velocity: Self::default_velocity(),
            acceleration: Self::default_acceleration(),
            ready_velocity: Self::default_ready_velocity(),
            ready_acceleration: Self::default_ready_acceleration(),
            upstroke_delay_s: Self::default_upstroke_delay_s(),
            backswing_height_mm: Self::default_backswing_height_mm(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Time between sending a command and the actuator starting to move.
    #[serde(default = "TimingConfig::default_communication_latency_s")]
    pub communication_latency_s: f64,
    /// Subtracted from every target time to counter systematic first-beat lag.
    #[serde(default = "TimingConfig::default_first_hit_compensation_s")]
    pub first_hit_compensation_s: f64,
    /// Remaining time at which the deadline wait stops sleeping and starts polling.
    #[serde(default = "TimingConfig::default_coarse_margin_s")]
    pub coarse_margin_s: f64,
    /// Longest single sleep, bounding stop latency while far from a deadline.
    #[serde(default = "TimingConfig::default_coarse_tick_s")]
    pub coarse_tick_s: f64,
    #[serde(default = "TimingConfig::default_fine_poll_s")]
    pub fine_poll_s: f64,
    #[serde(default = "TimingConfig::default_hit_cue")]
    pub hit_cue: bool,
    /// Cue lag after the estimated physical arrival of a strike.
    #[serde(default = "TimingConfig::default_hit_cue_offset_s")]
    pub hit_cue_offset_s: f64,
    /// Lead-in returned when the preparation time cannot be estimated.
    #[serde(default = "TimingConfig::default_fallback_preparation_s")]
    pub fallback_preparation_s: f64,
}

impl TimingConfig {
    fn default_communication_latency_s() -> f64 {
        0.05
    }
    fn default_first_hit_compensation_s() -> f64 {
        0.4
    }
    fn default_coarse_margin_s() -> f64 {
        0.010
    }
    fn default_coarse_tick_s() -> f64 {
        0.020
    }
    fn default_fine_poll_s() -> f64 {
        0.0001
    }
    fn default_hit_cue() -> bool {
        true
    }
    fn default_hit_cue_offset_s() -> f64 {
        0.32
    }
    fn default_fallback_preparation_s() -> f64 {
        0.2
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            coarse_margin: Duration::from_secs_f64(self.coarse_margin_s),
            coarse_tick: Duration::from_secs_f64(self.coarse_tick_s),
            fine_poll: Duration::from_secs_f64(self.fine_poll_s),
        }
    }

    fn validate(&self) -> Result<(), DrumbotError> {
        for (name, value) in [
            ("timing.communication_latency_s", self.communication_latency_s),
            ("timing.first_hit_compensation_s", self.first_hit_compensation_s),
            ("timing.coarse_margin_s", self.coarse_margin_s),
            ("timing.hit_cue_offset_s", self.hit_cue_offset_s),
            ("timing.fallback_preparation_s", self.fallback_preparation_s),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DrumbotError::Config(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        for (name, value) in [
            ("timing.coarse_tick_s", self.coarse_tick_s),
            ("timing.fine_poll_s", self.fine_poll_s),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DrumbotError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        Ok(())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            communication_latency_s: Self::default_communication_latency_s(),
            first_hit_compensation_s: Self::default_first_hit_compensation_s(),
            coarse_margin_s: Self::default_coarse_margin_s(),
            coarse_tick_s: Self::default_coarse_tick_s(),
            fine_poll_s: Self::default_fine_poll_s(),
            hit_cue: Self::default_hit_cue(),
            hit_cue_offset_s: Self::default_hit_cue_offset_s(),
            fallback_preparation_s: Self::default_fallback_preparation_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "CalibrationConfig::default_fallback_duration_s")]
    pub fallback_duration_s: f64,
    #[serde(default = "CalibrationConfig::default_fallback_distance_mm")]
    pub fallback_distance_mm: f64,
}

impl CalibrationConfig {
    fn default_fallback_duration_s() -> f64 {
        0.2
    }
    fn default_fallback_distance_mm() -> f64 {
        30.0
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            path: None,
            fallback_duration_s: Self::default_fallback_duration_s(),
            fallback_distance_mm: Self::default_fallback_distance_mm(),
        }
    }
}

/// Which entrainment strategy to run, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControllerConfig {
    Passthrough,
    Linear(LinearConfig),
    Staged(StagedConfig),
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig::Passthrough
    }
}

impl ControllerConfig {
    /// Default-parameter config for a strategy name ("passthrough", "linear", "staged").
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "none" => Some(ControllerConfig::Passthrough),
            "linear" => Some(ControllerConfig::Linear(LinearConfig::default())),
            "staged" | "linear-staged" => Some(ControllerConfig::Staged(StagedConfig::default())),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), DrumbotError> {
        match self {
            ControllerConfig::Passthrough => Ok(()),
            ControllerConfig::Linear(c) => {
                check_unit_interval("controller.correction_rate", c.correction_rate)?;
                check_unit_interval("controller.decay_factor", c.decay_factor)?;
                check_deadband(c.deadband_ms)
            }
            ControllerConfig::Staged(c) => {
                check_unit_interval("controller.correction_rate", c.correction_rate)?;
                check_deadband(c.deadband_ms)?;
                if c.intervention_start_loop < c.analysis_loops {
                    return Err(DrumbotError::Config(format!(
                        "controller.intervention_start_loop ({}) must not precede analysis_loops ({})",
                        c.intervention_start_loop, c.analysis_loops
                    )));
                }
                if !(c.convergence_epsilon_ms > 0.0) {
                    return Err(DrumbotError::Config(
                        "controller.convergence_epsilon_ms must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<(), DrumbotError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(DrumbotError::Config(format!("{} must be in (0, 1), got {}", name, value)))
    }
}

fn check_deadband(value: f64) -> Result<(), DrumbotError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DrumbotError::Config(format!("controller.deadband_ms must be >= 0, got {}", value)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConfig {
    #[serde(default = "LinearConfig::default_analysis_loops")]
    pub analysis_loops: usize,
    #[serde(default = "LinearConfig::default_correction_rate")]
    pub correction_rate: f64,
    #[serde(default = "LinearConfig::default_decay_factor")]
    pub decay_factor: f64,
    #[serde(default = "LinearConfig::default_deadband_ms")]
    pub deadband_ms: f64,
}

impl LinearConfig {
    fn default_analysis_loops() -> usize {
        2
    }
    fn default_correction_rate() -> f64 {
        0.10
    }
    fn default_decay_factor() -> f64 {
        0.95
    }
    fn default_deadband_ms() -> f64 {
        0.1
    }
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            analysis_loops: Self::default_analysis_loops(),
            correction_rate: Self::default_correction_rate(),
            decay_factor: Self::default_decay_factor(),
            deadband_ms: Self::default_deadband_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedConfig {
    #[serde(default = "StagedConfig::default_analysis_loops")]
    pub analysis_loops: usize,
    #[serde(default = "StagedConfig::default_intervention_start_loop")]
    pub intervention_start_loop: usize,
    #[serde(default = "StagedConfig::default_correction_rate")]
    pub correction_rate: f64,
    #[serde(default = "StagedConfig::default_convergence_epsilon_ms")]
    pub convergence_epsilon_ms: f64,
    #[serde(default = "StagedConfig::default_deadband_ms")]
    pub deadband_ms: f64,
}

impl StagedConfig {
    fn default_analysis_loops() -> usize {
        3
    }
    fn default_intervention_start_loop() -> usize {
        5
    }
    fn default_correction_rate() -> f64 {
        0.07
    }
    fn default_convergence_epsilon_ms() -> f64 {
        0.1
    }
    fn default_deadband_ms() -> f64 {
        0.1
    }
}

impl Default for StagedConfig {
    fn default() -> Self {
        Self {
            analysis_loops: Self::default_analysis_loops(),
            intervention_start_loop: Self::default_intervention_start_loop(),
            correction_rate: Self::default_correction_rate(),
            convergence_epsilon_ms: Self::default_convergence_epsilon_ms(),
            deadband_ms: Self::default_deadband_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_rig_defaults() {
        let config = RigConfig::from_yaml("{}").unwrap();
        assert_eq!(config.motion.velocity, 1000.0);
        assert_eq!(config.motion.upstroke_delay_s, 0.01);
        assert_eq!(config.timing.communication_latency_s, 0.05);
        assert_eq!(config.timing.first_hit_compensation_s, 0.4);
        assert_eq!(config.actuators.top.strike_pose, Pose::new(226.0, 0.3, 41.0, 0.0));
        assert_eq!(config.actuators.port(TrackName::Top), "COM4");
        assert_eq!(config.actuators.port(TrackName::Bottom), "COM3");
        assert_eq!(config.controller, ControllerConfig::Passthrough);
    }

    #[test]
    fn test_partial_actuator_block() {
        let config = RigConfig::from_yaml(
            r#"
actuators:
  bottom:
    port: /dev/ttyUSB1
    strike_pose: [220, 5, 38, 0]
"#,
        )
        .unwrap();
        assert_eq!(config.actuators.port(TrackName::Bottom), "/dev/ttyUSB1");
        assert_eq!(config.actuators.bottom.strike_pose, Pose::new(220.0, 5.0, 38.0, 0.0));
        assert_eq!(config.actuators.bottom.ready_pose, Pose::new(230.0, 0.0, 60.0, 0.0));
    }

    #[test]
    fn test_staged_controller_defaults() {
        let config = RigConfig::from_yaml("controller:\n  kind: staged\n").unwrap();
        match config.controller {
            ControllerConfig::Staged(c) => {
                assert_eq!(c.analysis_loops, 3);
                assert_eq!(c.intervention_start_loop, 5);
                assert_eq!(c.correction_rate, 0.07);
            }
            other => panic!("expected staged, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_rate_outside_unit_interval() {
        let err = RigConfig::from_yaml("controller:\n  kind: linear\n  correction_rate: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("correction_rate"));
    }

    #[test]
    fn test_rejects_inverted_safety_box() {
        let err = RigConfig::from_yaml("safety:\n  z_min: 200\n").unwrap_err();
        assert!(matches!(err, DrumbotError::Config(_)));
    }

    #[test]
    fn test_rejects_intervention_before_analysis() {
        let err = RigConfig::from_yaml(
            "controller:\n  kind: staged\n  analysis_loops: 4\n  intervention_start_loop: 2\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("intervention_start_loop"));
    }

    #[test]
    fn test_yaml_round_trip_keeps_values() {
        let mut config = RigConfig::default();
        config.timing.hit_cue = false;
        config.controller = ControllerConfig::Linear(LinearConfig::default());
        let text = config.to_yaml().unwrap();
        let back = RigConfig::from_yaml(&text).unwrap();
        assert!(!back.timing.hit_cue);
        assert_eq!(back.controller, config.controller);
    }

    #[test]
    fn test_controller_from_kind() {
        assert_eq!(ControllerConfig::from_kind("none"), Some(ControllerConfig::Passthrough));
        assert!(matches!(ControllerConfig::from_kind("Linear"), Some(ControllerConfig::Linear(_))));
        assert_eq!(ControllerConfig::from_kind("pid"), None);
    }
}
