//! # Motion Module
//!
//! Compile one track of a practice score into a time-ordered motion plan.
//!
//! ## Purpose
//! The scheduler never looks at notes. It executes a flat list of
//! [`MotionStep`]s, each saying *where* the arm must be and *when* (in seconds
//! from the start of the loop). This module produces that list.
//!
//! ## Sub-modules
//! - `types` - MotionStep, MotionAction, MotionPlan, StrikeProfile
//! - `compiler` - Note filtering, timing, backswing computation
//!
//! ## Entry Point
//! [`compile_track()`] - Convert a `Track` to a `MotionPlan`
//!
//! ## Example
//! ```rust
//! use drumbot_core::motion::{compile_track, StrikeProfile};
//! use drumbot_core::{RigConfig, ScoreItem, Track, TrackName};
//!
//! let items = (0..4).map(|beat| ScoreItem::note(beat as f64, 1.0)).collect();
//! let track = Track::new(120.0, 4, 4, 1, items);
//! let profile = StrikeProfile::from_config(&RigConfig::default(), TrackName::Top);
//!
//! let plan = compile_track(TrackName::Top, &track, &profile);
//!
//! assert_eq!(plan.len(), 8);
//! assert_eq!(plan.steps()[2].target_time_s, 0.5);
//! ```
//!
//! ## Two Steps Per Note
//!
//! ### Strike
//! - Lands on the beat, so its send time must account for the real move
//!   duration (looked up in the calibration table at run time)
//! - `is_compensated = false`
//!
//! ### Upstroke
//! - Starts a fixed delay after the strike and only needs to get the stick out
//!   of the way, so it is sent against the guided time minus latency only
//! - `is_compensated = true`
//!
//! ## Related Modules
//! - `score` - Input Track type
//! - `scheduler` - Executes the plan
//! - `calibration` - Converts strike travel distance into move duration

mod compiler;
mod types;

#[cfg(test)]
mod tests;

pub use compiler::compile_track;
pub use types::{MotionAction, MotionPlan, MotionStep, StrikeProfile};
