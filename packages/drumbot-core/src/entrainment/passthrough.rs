//! Neutral baseline: plays the score exactly as written.

use super::judgement::LoopJudgements;
use super::state::EntrainmentState;
use super::{Entrainment, GuidedTiming};
use crate::score::TrackName;

#[derive(Debug, Clone, Default)]
pub struct Passthrough;

impl Entrainment for Passthrough {
    fn name(&self) -> &'static str {
        "No intervention (score as written)"
    }

    fn guided_timing(&self, _track: TrackName, ideal_ms: f64) -> GuidedTiming {
        GuidedTiming::unchanged(ideal_ms)
    }

    fn update_performance_data(&mut self, _history: &[LoopJudgements]) -> Option<String> {
        None
    }

    fn reset(&mut self) {}

    fn state(&self) -> EntrainmentState {
        EntrainmentState::default()
    }
}
