use super::*;
use crate::config::{LinearConfig, StagedConfig};
use std::thread;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn top_loop(errors: &[f64]) -> LoopJudgements {
    errors
        .iter()
        .map(|&e| Judgement::hit(TrackName::Top, e, JudgementKind::Good))
        .collect()
}

#[test]
fn test_passthrough_returns_ideal_time() {
    let mut controller = Passthrough;
    let timing = controller.guided_timing(TrackName::Bottom, 750.0);
    assert_eq!(timing, GuidedTiming::unchanged(750.0));
    assert!(controller.update_performance_data(&[top_loop(&[80.0])]).is_none());
    assert!(approx(controller.guided_timing(TrackName::Top, 750.0).time_ms, 750.0));
}

#[test]
fn test_linear_collects_during_analysis_loops() {
    let mut controller = LinearCorrector::new(LinearConfig::default());
    let mut history = Vec::new();

    for i in 0..2 {
        history.push(top_loop(&[25.0]));
        let log = controller.update_performance_data(&history).unwrap();
        assert!(log.contains(&format!("Loop {}", i)));
        assert!(log.contains("collection"));
        assert_eq!(controller.state().offsets_ms, TrackOffsets::default());
        assert!(controller.guided_timing(TrackName::Top, 1000.0).log.is_none());
    }
}

#[test]
fn test_linear_offset_from_latest_loop() {
    let mut controller = LinearCorrector::new(LinearConfig::default());
    let mut history = vec![top_loop(&[5.0]), top_loop(&[-5.0])];
    controller.update_performance_data(&history[..1]);
    controller.update_performance_data(&history);

    history.push(top_loop(&[30.0, 50.0]));
    let log = controller.update_performance_data(&history).unwrap();
    assert!(log.starts_with("Loop 2"));

    let state = controller.state();
    assert!(approx(state.offsets_ms.top, 36.0));
    assert!(approx(state.offsets_ms.bottom, 0.0));
    assert!(state.intervention_active);

    let timing = controller.guided_timing(TrackName::Top, 1000.0);
    assert!(approx(timing.time_ms, 1036.0));
    assert!(timing.log.is_some());
}

#[test]
fn test_linear_decays_without_hits() {
    let mut controller = LinearCorrector::new(LinearConfig::default());
    let mut history = vec![top_loop(&[]), top_loop(&[]), top_loop(&[40.0])];
    for n in 1..=history.len() {
        controller.update_performance_data(&history[..n]);
    }
    assert!(approx(controller.state().offsets_ms.top, 36.0));

    history.push(vec![Judgement::dropped(TrackName::Top)]);
    let log = controller.update_performance_data(&history).unwrap();
    assert!(log.contains("No input"));
    assert!(approx(controller.state().offsets_ms.top, 36.0 * 0.95));
}

#[test]
fn test_linear_deadband_leaves_time_unchanged() {
    let mut controller = LinearCorrector::new(LinearConfig::default());
    let history = vec![top_loop(&[]), top_loop(&[]), top_loop(&[0.1])];
    for n in 1..=history.len() {
        controller.update_performance_data(&history[..n]);
    }
    // 0.1 * 0.9 sits inside the 0.1 ms deadband
    assert!(approx(controller.state().offsets_ms.top, 0.09));
    assert_eq!(controller.guided_timing(TrackName::Top, 500.0), GuidedTiming::unchanged(500.0));
}

#[test]
fn test_empty_history_is_ignored() {
    let mut linear = LinearCorrector::new(LinearConfig::default());
    let mut staged = StagedCorrector::new(StagedConfig::default());
    assert!(linear.update_performance_data(&[]).is_none());
    assert!(staged.update_performance_data(&[]).is_none());
    assert_eq!(linear.state().loop_count, 0);
}

#[test]
fn test_staged_establishes_then_intervenes() {
    let mut controller = StagedCorrector::new(StagedConfig::default());
    let mut history = Vec::new();
    let mut logs = Vec::new();
    for error in [10.0, 20.0, 30.0, 20.0, 20.0] {
        history.push(top_loop(&[error]));
        logs.push(controller.update_performance_data(&history));
    }

    assert!(logs[0].as_deref().unwrap().contains("Data collection"));
    assert!(logs[2].as_deref().unwrap().contains("Data collection"));
    assert!(logs[3].as_deref().unwrap().contains("Analysis complete"));
    assert!(logs[4].is_none());

    // Mean of every error in loops 0..=3
    assert!(approx(controller.state().offsets_ms.top, 20.0));
    assert_eq!(controller.phase(), StagedPhase::Established);
    // Established but not yet applied
    assert_eq!(controller.guided_timing(TrackName::Top, 1000.0), GuidedTiming::unchanged(1000.0));

    history.push(top_loop(&[]));
    let log = controller.update_performance_data(&history).unwrap();
    assert!(log.contains("Intervention active"));
    assert_eq!(controller.phase(), StagedPhase::Intervening);
    assert!(approx(controller.state().offsets_ms.top, 20.0 * 0.93));

    let timing = controller.guided_timing(TrackName::Top, 1000.0);
    assert!(approx(timing.time_ms, 1000.0 + 20.0 * 0.93));
    assert!(timing.log.is_some());
}

#[test]
fn test_staged_converges_and_rebases() {
    let mut controller = StagedCorrector::new(StagedConfig::default());
    let mut history = Vec::new();
    let mut converged_at = None;

    for _ in 0..200 {
        history.push(top_loop(&[1.0]));
        let log = controller.update_performance_data(&history);
        if log.as_deref().map_or(false, |l| l.contains("converged")) {
            converged_at = Some(history.len());
            break;
        }
    }

    // 1.0 * 0.93^k < 0.1 first holds at k = 32, intervention starts at loop 5
    let converged_at = converged_at.unwrap();
    assert_eq!(converged_at, 5 + 32);

    let state = controller.state();
    assert_eq!(state.loop_offset, converged_at);
    assert_eq!(state.offsets_ms, TrackOffsets::default());
    assert!(!state.intervention_active);
    assert_eq!(controller.phase(), StagedPhase::Collecting);

    history.push(top_loop(&[1.0]));
    let log = controller.update_performance_data(&history).unwrap();
    assert!(log.contains("Loop 0: Data collection"));
}

#[test]
fn test_staged_establish_averages_only_current_cycle() {
    let config = StagedConfig {
        analysis_loops: 1,
        intervention_start_loop: 1,
        correction_rate: 0.5,
        convergence_epsilon_ms: 1.0,
        deadband_ms: 0.1,
    };
    let mut controller = StagedCorrector::new(config);
    let mut history = vec![top_loop(&[100.0])];
    controller.update_performance_data(&history);

    // Establish and first intervention land on the same loop
    history.push(top_loop(&[100.0]));
    let log = controller.update_performance_data(&history).unwrap();
    assert!(log.contains("Analysis complete"));
    assert!(approx(controller.state().offsets_ms.top, 50.0));

    while controller.state().intervention_active {
        history.push(top_loop(&[]));
        controller.update_performance_data(&history);
    }
    let rebased_at = controller.state().loop_offset;
    assert_eq!(rebased_at, history.len());

    history.push(top_loop(&[-8.0]));
    controller.update_performance_data(&history);
    history.push(top_loop(&[-8.0]));
    controller.update_performance_data(&history);
    // Old +100 ms loops are not part of the new average
    assert!(approx(controller.state().offsets_ms.top, -4.0));
}

#[test]
fn test_reset_clears_state() {
    let handle = ControllerHandle::from_config(&ControllerConfig::Linear(LinearConfig::default()));
    let history = vec![top_loop(&[40.0]), top_loop(&[40.0]), top_loop(&[40.0])];
    for n in 1..=history.len() {
        handle.update_performance_data(&history[..n]);
    }
    assert_eq!(handle.snapshot().history.len(), 3);
    assert!(handle.snapshot().offsets_ms.top > 0.0);

    handle.reset();
    assert_eq!(handle.snapshot(), EntrainmentState::default());
    assert!(approx(handle.guided_timing(TrackName::Top, 1000.0).time_ms, 1000.0));
}

#[test]
fn test_history_is_bounded() {
    let handle = ControllerHandle::from_config(&ControllerConfig::Linear(LinearConfig::default()));
    let mut history = Vec::new();
    for _ in 0..(HISTORY_CAPACITY + 8) {
        history.push(top_loop(&[3.0]));
        handle.update_performance_data(&history);
    }
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.history.len(), HISTORY_CAPACITY);
    assert_eq!(snapshot.history.front().unwrap().loop_index, 8);
    assert_eq!(snapshot.loop_count, HISTORY_CAPACITY + 8);
}

#[test]
fn test_controller_names() {
    assert_eq!(ControllerHandle::passthrough().name(), "No intervention (score as written)");
    let staged = ControllerHandle::from_config(&ControllerConfig::from_kind("staged").unwrap());
    assert_eq!(staged.name(), "Linear-staged corrector");
}

#[test]
fn test_handle_shared_across_threads() {
    let handle = ControllerHandle::from_config(&ControllerConfig::Linear(LinearConfig::default()));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let t = handle.guided_timing(TrackName::Top, 1000.0).time_ms;
                    assert!(t == 1000.0 || (t - 1036.0).abs() < 1e-9);
                }
            })
        })
        .collect();

    let history = vec![top_loop(&[40.0]), top_loop(&[40.0]), top_loop(&[40.0])];
    for n in 1..=history.len() {
        handle.update_performance_data(&history[..n]);
    }
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(approx(handle.guided_timing(TrackName::Top, 1000.0).time_ms, 1036.0));
}
