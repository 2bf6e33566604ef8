//! Integration tests for the drumbot session layer

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use drumbot::{load_rig_config, replay_history, JudgementFeed, PracticeSession, ScoreSource, SessionError};
use drumbot_core::driver::{DriverCall, SimulatedFactory};
use drumbot_core::entrainment::{history_from_json, Judgement, JudgementKind};
use drumbot_core::{
    ActuatorManager, ActuatorState, CalibrationTable, ControllerConfig, RigConfig, Score, TrackName,
};
use serde_json::json;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn temp_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("drumbot-{}-{}", std::process::id(), name));
    fs::write(&path, content).unwrap();
    path
}

fn quick_score() -> Score {
    Score::from_value(json!({
        "top": {"bpm": 600, "measures": 1, "items": [
            {"beat": 0, "duration": 1, "class": "note"},
            {"beat": 2, "duration": 1, "class": "note"}
        ]}
    }))
    .unwrap()
}

fn simulated_session(factory: &Arc<SimulatedFactory>, loops: usize) -> PracticeSession {
    let mut config = RigConfig::default();
    config.controller = ControllerConfig::from_kind("linear").unwrap();
    let manager = ActuatorManager::new(config, Arc::new(CalibrationTable::empty(1000.0, 1000.0)), factory.clone())
        .with_max_loops(Some(loops));
    PracticeSession::new(manager)
}

#[test]
fn test_demo_score_loads() {
    let score = ScoreSource::Demo("tutorial".to_string()).load().unwrap();
    assert_eq!(score.top.note_count(), 4);
    assert!(!score.is_single_actuator());
}

#[test]
fn test_unknown_demo_lists_available_scores() {
    let err = ScoreSource::Demo("no-such-score".to_string()).load().unwrap_err();
    match err {
        SessionError::UnknownDemo { name, available } => {
            assert_eq!(name, "no-such-score");
            assert!(available.contains("tutorial"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_score_file_loads_and_validates() {
    let good = temp_file("good.json", r#"{"top": {"bpm": 90, "items": [{"beat": 0, "duration": 1, "class": "note"}]}}"#);
    let score = ScoreSource::File(good.clone()).load().unwrap();
    assert_eq!(score.top.bpm, 90.0);
    fs::remove_file(good).ok();

    let bad = temp_file("bad.json", r#"{"top": {"bpm": 0, "items": []}}"#);
    assert!(matches!(ScoreSource::File(bad.clone()).load(), Err(SessionError::Core(_))));
    fs::remove_file(bad).ok();

    let missing = ScoreSource::File(PathBuf::from("/nonexistent/score.json")).load();
    assert!(matches!(missing, Err(SessionError::Read { .. })));
}

#[test]
fn test_rig_config_defaults_and_overrides() {
    let config = load_rig_config(None).unwrap();
    assert_eq!(config.timing.first_hit_compensation_s, 0.4);

    let path = temp_file(
        "rig.yaml",
        "timing:\n  communication_latency_s: 0.02\ncontroller:\n  kind: staged\n",
    );
    let config = load_rig_config(Some(&path)).unwrap();
    assert_eq!(config.timing.communication_latency_s, 0.02);
    assert!(matches!(config.controller, ControllerConfig::Staged(_)));
    fs::remove_file(path).ok();
}

#[test]
fn test_replay_reports_each_loop() {
    let history = history_from_json(
        r#"[
            [{"pad": "top", "error_ms": 12.0, "judgement": "good"}],
            [{"pad": "top", "error_ms": null, "judgement": "dropped"}],
            [{"pad": "top", "error_ms": 40.0, "judgement": "good"}],
            []
        ]"#,
    )
    .unwrap();

    let steps = replay_history(&ControllerConfig::from_kind("linear").unwrap(), &history);
    assert_eq!(steps.len(), 4);
    assert_eq!(steps.iter().map(|s| s.loop_index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert!(steps[0].log.as_deref().unwrap().contains("initial data collection"));
    assert!(!steps[1].intervention_active);
    assert!(steps[2].intervention_active);
    assert!(approx(steps[2].offsets_ms.top, 36.0));
    assert!(approx(steps[3].offsets_ms.top, 36.0 * 0.95));

    let passthrough = replay_history(&ControllerConfig::Passthrough, &history);
    assert!(passthrough.iter().all(|s| s.offsets_ms.top == 0.0));
}

#[test]
fn test_session_feeds_controller_and_resets_on_start() {
    let factory = Arc::new(SimulatedFactory::new());
    let mut session = simulated_session(&factory, 1);
    let score = quick_score();

    session.start(&score, Some(0.0)).unwrap();
    for _ in 0..3 {
        session.feed_loop(vec![Judgement::hit(TrackName::Top, 40.0, JudgementKind::Good)]);
    }
    assert_eq!(session.history().len(), 3);
    assert!(approx(session.controller().snapshot().offsets_ms.top, 36.0));

    let outcomes = session.join();
    assert!(outcomes[&TrackName::Top].is_ok());
    assert_eq!(session.statuses()[&TrackName::Top], ActuatorState::Terminated);

    session.start(&score, Some(0.0)).unwrap();
    assert!(session.history().is_empty());
    assert_eq!(session.controller().snapshot().offsets_ms.top, 0.0);
    session.join();

    let top = factory.log(TrackName::Top);
    assert_eq!(top.count(|c| matches!(c, DriverCall::Connect { .. })), 2);
}

#[test]
fn test_session_stop_parks_arms() {
    let factory = Arc::new(SimulatedFactory::new());
    let mut session = simulated_session(&factory, 1000);
    session.start(&quick_score(), None).unwrap();
    assert!(session.is_running());

    let outcomes = session.emergency_stop();
    assert!(outcomes.values().all(|r| r.is_ok()));
    assert!(!session.is_running());
    assert_eq!(factory.log(TrackName::Top).calls().last(), Some(&DriverCall::Disconnect));
}

#[test]
fn test_default_lead_in_matches_estimate() {
    let factory = Arc::new(SimulatedFactory::new());
    let session = simulated_session(&factory, 1);
    // fallback move 0.2 + compensation 0.4 + latency 0.05
    assert!(approx(session.lead_in_s(&quick_score()), 0.65));
}

#[test]
fn test_judgement_feed_keeps_polling_rate_after_sender_hangs_up() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut feed = JudgementFeed::new(rx);
    tx.send(vec![Judgement::hit(TrackName::Top, 5.0, JudgementKind::Good)]).unwrap();
    drop(tx);

    assert_eq!(feed.next(Duration::from_millis(20)).map(|l| l.len()), Some(1));
    assert!(feed.is_open());

    let started = Instant::now();
    for _ in 0..3 {
        assert!(feed.next(Duration::from_millis(20)).is_none());
    }
    assert!(!feed.is_open());
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn test_closed_judgement_feed_sleeps() {
    let mut feed = JudgementFeed::closed();
    let started = Instant::now();
    assert!(feed.next(Duration::from_millis(20)).is_none());
    assert!(started.elapsed() >= Duration::from_millis(20));
}
