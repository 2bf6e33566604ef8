//! Controller state shared by the strategy variants

use serde::Serialize;
use std::collections::VecDeque;

use super::judgement::{errors_for, mean, Judgement};
use crate::score::TrackName;

/// Loop summaries kept per controller.
pub const HISTORY_CAPACITY: usize = 32;

/// Per-track phase offset in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrackOffsets {
    pub top: f64,
    pub bottom: f64,
}

impl TrackOffsets {
    pub fn get(&self, track: TrackName) -> f64 {
        match track {
            TrackName::Top => self.top,
            TrackName::Bottom => self.bottom,
        }
    }

    pub fn set(&mut self, track: TrackName, value: f64) {
        match track {
            TrackName::Top => self.top = value,
            TrackName::Bottom => self.bottom = value,
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.top *= factor;
        self.bottom *= factor;
    }

    /// Largest absolute offset across tracks.
    pub fn max_abs(&self) -> f64 {
        self.top.abs().max(self.bottom.abs())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackLoopStats {
    pub track: TrackName,
    pub hits: usize,
    pub mean_error_ms: Option<f64>,
}

/// Error summary of one completed loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopSummary {
    pub loop_index: usize,
    pub tracks: Vec<TrackLoopStats>,
}

impl LoopSummary {
    pub fn from_loop(loop_index: usize, judgements: &[Judgement]) -> Self {
        let tracks = TrackName::ALL
            .iter()
            .map(|&track| {
                let errors = errors_for(judgements, track);
                TrackLoopStats {
                    track,
                    hits: errors.len(),
                    mean_error_ms: mean(&errors),
                }
            })
            .collect();
        Self { loop_index, tracks }
    }

    pub fn mean_error_ms(&self, track: TrackName) -> Option<f64> {
        self.tracks
            .iter()
            .find(|t| t.track == track)
            .and_then(|t| t.mean_error_ms)
    }
}

/// Snapshot of a controller's mutable state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntrainmentState {
    pub offsets_ms: TrackOffsets,
    /// Absolute loop count at which the current analysis cycle started.
    pub loop_offset: usize,
    /// Completed loops seen so far.
    pub loop_count: usize,
    pub intervention_active: bool,
    pub history: VecDeque<LoopSummary>,
}

impl EntrainmentState {
    pub(crate) fn record(&mut self, summary: LoopSummary) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }
}
