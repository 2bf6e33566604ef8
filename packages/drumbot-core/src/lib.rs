pub mod calibration;
pub mod config;
pub mod deadline;
pub mod driver;
pub mod entrainment;
pub mod error;
pub mod events;
pub mod manager;
pub mod motion;
pub mod pose;
pub mod scheduler;
pub mod score;

pub use calibration::{CalibrationSample, CalibrationTable};
pub use config::{ControllerConfig, LinearConfig, RigConfig, StagedConfig};
pub use entrainment::{ControllerHandle, Entrainment, EntrainmentController, GuidedTiming};
pub use error::*;
pub use events::{EventSink, SchedulerEvent};
pub use manager::{shared_loop_duration, ActuatorManager};
pub use motion::{compile_track, MotionPlan, MotionStep};
pub use pose::{Pose, SafetyBox};
pub use scheduler::ActuatorState;
pub use score::{validate, ItemClass, Score, ScoreItem, Track, TrackName};

/// Compile every track of a score with the rig's poses and speeds.
/// Tracks without notes yield empty plans.
pub fn compile_score(score: &Score, config: &RigConfig) -> Vec<MotionPlan> {
    score
        .tracks()
        .map(|(name, track)| {
            let profile = motion::StrikeProfile::from_config(config, name);
            compile_track(name, track, &profile)
        })
        .collect()
}

/// Load the calibration table configured for the rig's speed setting.
///
/// No configured path means an empty table (fallback durations only).
pub fn load_calibration(config: &RigConfig) -> Result<CalibrationTable, DrumbotError> {
    let table = match &config.calibration.path {
        Some(path) => CalibrationTable::load(path, config.motion.velocity, config.motion.acceleration)?,
        None => CalibrationTable::empty(config.motion.velocity, config.motion.acceleration),
    };
    Ok(table.with_fallbacks(
        config.calibration.fallback_duration_s,
        config.calibration.fallback_distance_mm,
    ))
}
