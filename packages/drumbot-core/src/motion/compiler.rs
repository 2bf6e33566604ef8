//! Motion plan compiler
//!
//! Turns the notes of one track into strike/upstroke step pairs.

use tracing::debug;

use super::types::{MotionAction, MotionPlan, MotionStep, StrikeProfile};
use crate::score::{Track, TrackName};

/// Compile a track into a sorted motion plan.
///
/// # Algorithm
/// 1. Keep only `Note` items, sorted by beat
/// 2. For each note at `beat`: `strike_time = beat * 60 / bpm`
/// 3. Emit a Strike at `strike_time` to the clamped strike pose
/// 4. Emit an Upstroke at `strike_time + upstroke_delay_s` to the backswing pose
/// 5. Stable-sort by target time so a strike stays ahead of anything sharing its instant
///
/// A track with no notes compiles to an empty plan.
///
/// # Parameters
/// - `name`: Which actuator this plan is for (carried in the plan for logging)
/// - `track`: Source track; only read
/// - `profile`: Poses, speed and safety box for the actuator
pub fn compile_track(name: TrackName, track: &Track, profile: &StrikeProfile) -> MotionPlan {
    let loop_duration_s = track.loop_duration_s();
    let notes = track.notes();
    if notes.is_empty() {
        debug!(track = %name, "no notes; empty motion plan");
        return MotionPlan::new(name, loop_duration_s, Vec::new());
    }

    let seconds_per_beat = track.seconds_per_beat();
    let strike_pose = profile.safe_strike_pose();
    let backswing_pose = profile.backswing_pose();

    let mut steps = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        let strike_time = note.beat * seconds_per_beat;

        steps.push(MotionStep {
            target_time_s: strike_time,
            pose: strike_pose,
            velocity: profile.velocity,
            acceleration: profile.acceleration,
            action: MotionAction::Strike,
            is_compensated: false,
        });

        steps.push(MotionStep {
            target_time_s: strike_time + profile.upstroke_delay_s,
            pose: backswing_pose,
            velocity: profile.velocity,
            acceleration: profile.acceleration,
            action: MotionAction::Upstroke,
            is_compensated: true,
        });
    }

    steps.sort_by(|a, b| a.target_time_s.total_cmp(&b.target_time_s));

    debug!(
        track = %name,
        steps = steps.len(),
        velocity = profile.velocity,
        acceleration = profile.acceleration,
        backswing_z = backswing_pose.z,
        "motion plan compiled"
    );

    MotionPlan::new(name, loop_duration_s, steps)
}
