use super::*;
use crate::config::RigConfig;
use crate::pose::{Pose, SafetyBox};
use crate::score::{ScoreItem, Track, TrackName};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn default_profile() -> StrikeProfile {
    StrikeProfile::from_config(&RigConfig::default(), TrackName::Top)
}

fn quarter_notes(beats: &[f64]) -> Vec<ScoreItem> {
    beats.iter().map(|&b| ScoreItem::note(b, 1.0)).collect()
}

#[test]
fn test_four_quarter_notes_at_120() {
    let track = Track::new(120.0, 4, 4, 1, quarter_notes(&[0.0, 1.0, 2.0, 3.0]));
    let plan = compile_track(TrackName::Top, &track, &default_profile());

    assert_eq!(plan.len(), 8);
    let strikes: Vec<f64> = plan
        .steps()
        .iter()
        .filter(|s| s.action == MotionAction::Strike)
        .map(|s| s.target_time_s)
        .collect();
    let upstrokes: Vec<f64> = plan
        .steps()
        .iter()
        .filter(|s| s.action == MotionAction::Upstroke)
        .map(|s| s.target_time_s)
        .collect();

    for (got, want) in strikes.iter().zip([0.0, 0.5, 1.0, 1.5]) {
        assert!(approx(*got, want), "strike {} != {}", got, want);
    }
    for (got, want) in upstrokes.iter().zip([0.01, 0.51, 1.01, 1.51]) {
        assert!(approx(*got, want), "upstroke {} != {}", got, want);
    }
    assert_eq!(strikes.len(), 4);
    assert_eq!(upstrokes.len(), 4);
}

#[test]
fn test_steps_alternate_strike_then_upstroke() {
    let track = Track::new(120.0, 4, 4, 1, quarter_notes(&[0.0, 1.0, 2.0, 3.0]));
    let plan = compile_track(TrackName::Top, &track, &default_profile());
    for pair in plan.steps().chunks(2) {
        assert_eq!(pair[0].action, MotionAction::Strike);
        assert!(!pair[0].is_compensated);
        assert_eq!(pair[1].action, MotionAction::Upstroke);
        assert!(pair[1].is_compensated);
    }
}

#[test]
fn test_plan_is_sorted_regardless_of_item_order() {
    let track = Track::new(
        90.0,
        3,
        4,
        2,
        vec![
            ScoreItem::note(4.5, 0.5),
            ScoreItem::rest(0.0, 1.0),
            ScoreItem::note(1.0, 1.0),
            ScoreItem::note(3.0, 1.0),
        ],
    );
    let plan = compile_track(TrackName::Bottom, &track, &default_profile());
    assert_eq!(plan.len(), 6);
    assert!(plan
        .steps()
        .windows(2)
        .all(|w| w[0].target_time_s <= w[1].target_time_s));
    assert!(approx(plan.steps()[0].target_time_s, 60.0 / 90.0));
    assert!(approx(plan.loop_duration_s, 6.0 * 60.0 / 90.0));
    assert_eq!(plan.track, TrackName::Bottom);
}

#[test]
fn test_rests_only_gives_empty_plan() {
    let track = Track::new(120.0, 4, 4, 1, vec![ScoreItem::rest(0.0, 4.0)]);
    let plan = compile_track(TrackName::Top, &track, &default_profile());
    assert!(plan.is_empty());
    assert!(plan.first().is_none());
    assert!(approx(plan.loop_duration_s, 2.0));
}

#[test]
fn test_deterministic_output() {
    let track = Track::new(133.0, 7, 8, 2, quarter_notes(&[0.0, 0.5, 1.75, 2.25, 3.0]));
    let a = compile_track(TrackName::Top, &track, &default_profile());
    let b = compile_track(TrackName::Top, &track, &default_profile());
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn test_default_backswing_pose() {
    let profile = default_profile();
    let backswing = profile.backswing_pose();
    // strike z 41 + 35 = 76, at ready x/y/r
    assert_eq!(backswing, Pose::new(230.0, 0.0, 76.0, 0.0));
    let track = Track::new(120.0, 4, 4, 1, quarter_notes(&[0.0]));
    let plan = compile_track(TrackName::Top, &track, &profile);
    assert_eq!(plan.steps()[0].pose, Pose::new(226.0, 0.3, 41.0, 0.0));
    assert_eq!(plan.steps()[1].pose, backswing);
}

#[test]
fn test_backswing_capped_at_safety_ceiling() {
    let mut profile = default_profile();
    profile.strike_pose = Pose::new(226.0, 0.3, 110.0, 0.0);
    profile.backswing_height_mm = 50.0;
    assert_eq!(profile.backswing_pose().z, 130.0);
}

#[test]
fn test_poses_clamped_into_safety_box() {
    let mut profile = default_profile();
    profile.strike_pose = Pose::new(400.0, -300.0, -20.0, 5.0);
    profile.safety = SafetyBox::default();
    let track = Track::new(120.0, 4, 4, 1, quarter_notes(&[0.0, 2.0]));
    let plan = compile_track(TrackName::Top, &track, &profile);
    for step in plan.steps() {
        assert!(profile.safety.contains(&step.pose), "{:?} outside box", step.pose);
    }
    assert_eq!(plan.steps()[0].pose, Pose::new(250.0, -180.0, 0.0, 5.0));
    assert_eq!(plan.steps()[1].pose.z, 35.0);
}

#[test]
fn test_speed_copied_from_profile() {
    let mut config = RigConfig::default();
    config.motion.velocity = 800.0;
    config.motion.acceleration = 600.0;
    let profile = StrikeProfile::from_config(&config, TrackName::Top);
    let track = Track::new(120.0, 4, 4, 1, quarter_notes(&[1.0]));
    let plan = compile_track(TrackName::Top, &track, &profile);
    assert!(plan.steps().iter().all(|s| s.velocity == 800.0 && s.acceleration == 600.0));
    assert_eq!(plan.strike_count(), 1);
}

#[test]
fn test_plan_serializes_camel_case() {
    let track = Track::new(120.0, 4, 4, 1, quarter_notes(&[0.0]));
    let plan = compile_track(TrackName::Top, &track, &default_profile());
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["track"], "top");
    assert_eq!(json["loopDurationS"], 2.0);
    assert_eq!(json["steps"][0]["action"], "strike");
    assert_eq!(json["steps"][0]["isCompensated"], false);
    assert_eq!(json["steps"][0]["targetTimeS"], 0.0);
}
