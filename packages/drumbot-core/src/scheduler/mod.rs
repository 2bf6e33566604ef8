//! # Scheduler Module
//!
//! One real-time loop per actuator, each on its own OS thread.
//!
//! ## Purpose
//! Executes a [`MotionPlan`](crate::motion::MotionPlan) against a wall-clock
//! anchor shared with the other actuator, correcting every step for the
//! controller's guided time, the calibrated move duration and communication
//! latency.
//!
//! ## Sub-modules
//! - `types` - ActuatorState, StatusBoard, SchedulerSettings
//! - `engine` - ActuatorScheduler: connect, loop, clean up
//!
//! ## Send Time
//!
//! ```text
//! target = loop_start + guided_ms / 1000 - first_hit_compensation
//! send   = target - latency                      (upstroke, is_compensated)
//! send   = target - move_duration - latency      (strike)
//! ```
//!
//! `move_duration` comes from the calibration table for the straight-line
//! distance between the previously commanded pose and the step's pose.
//!
//! ## Failure Handling
//! Any driver error unwinds to cleanup: a blocking move to the safe pose and a
//! disconnect, each attempted even if the other fails. The error is reported
//! through the actuator's status and never reaches sibling schedulers.

mod engine;
mod types;


pub use engine::ActuatorScheduler;
pub use types::{ActuatorState, SchedulerSettings, StatusBoard};
