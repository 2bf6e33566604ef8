//! # Score Types
//!
//! This module defines the practice score consumed by the motion compiler.
//!
//! ## Type Hierarchy
//! ```text
//! Score
//!   ├── top: Track
//!   └── bottom: Option<Track>   (None = single-actuator mode)
//!
//! Track
//!   ├── bpm, numerator, denominator
//!   ├── beats_per_measure = numerator / denominator * 4
//!   ├── total_beats       = beats_per_measure * measures
//!   └── Vec<ScoreItem>
//!         ├── beat, duration_beats
//!         ├── class: Note | Rest
//!         └── dotted
//! ```
//!
//! ## Input Format
//! Scores arrive as the JSON documents written by the rhythm editor:
//!
//! ```json
//! {
//!   "top": {
//!     "bpm": 100, "numerator": 4, "denominator": 4, "total_beats": 4,
//!     "items": [{"class": "note", "type": "quarter", "beat": 0.0, "duration": 1.0}]
//!   }
//! }
//! ```
//!
//! Missing numeric fields default (`bpm = 120`, `4/4`, two measures, item
//! `beat = 0`, `duration = 1`) instead of failing, and items whose `class` is
//! neither `note` nor `rest` are skipped. Values that are present but
//! unplayable are rejected by [`validate`].
//!
//! ## Related Modules
//! - `motion` - Compiles a `Track` into a motion plan
//! - `manager` - Derives the shared loop length from all tracks

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DrumbotError;

pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_NUMERATOR: u32 = 4;
pub const DEFAULT_DENOMINATOR: u32 = 4;
/// Measures per practice loop when the score does not say.
pub const DEFAULT_MEASURES: u32 = 2;

/// One of the two actuator tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackName {
    #[serde(alias = "left")]
    Top,
    #[serde(alias = "right")]
    Bottom,
}

impl TrackName {
    pub const ALL: [TrackName; 2] = [TrackName::Top, TrackName::Bottom];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackName::Top => "top",
            TrackName::Bottom => "bottom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" | "left" => Some(TrackName::Top),
            "bottom" | "right" => Some(TrackName::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for TrackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Note or rest. Only notes produce motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemClass {
    Note,
    Rest,
}

/// A single note or rest placed on the beat grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreItem {
    pub beat: f64,
    #[serde(rename = "duration")]
    pub duration_beats: f64,
    pub class: ItemClass,
    /// Glyph kind from the editor ("quarter", "eighth_rest", ...). Informational.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub dotted: bool,
}

impl ScoreItem {
    pub fn note(beat: f64, duration_beats: f64) -> Self {
        Self {
            beat,
            duration_beats,
            class: ItemClass::Note,
            kind: None,
            dotted: false,
        }
    }

    pub fn rest(beat: f64, duration_beats: f64) -> Self {
        Self {
            beat,
            duration_beats,
            class: ItemClass::Rest,
            kind: None,
            dotted: false,
        }
    }

    pub fn is_note(&self) -> bool {
        self.class == ItemClass::Note
    }
}

/// One track of a score, with its derived meter fields filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub bpm: f64,
    pub numerator: u32,
    pub denominator: u32,
    pub beats_per_measure: f64,
    pub total_beats: f64,
    pub items: Vec<ScoreItem>,
}

impl Default for Track {
    fn default() -> Self {
        Track::new(DEFAULT_BPM, DEFAULT_NUMERATOR, DEFAULT_DENOMINATOR, DEFAULT_MEASURES, Vec::new())
    }
}

impl Track {
    /// Build a track and derive `beats_per_measure` and `total_beats` from the meter.
    pub fn new(bpm: f64, numerator: u32, denominator: u32, measures: u32, items: Vec<ScoreItem>) -> Self {
        let beats_per_measure = beats_per_measure(numerator, denominator);
        Self {
            bpm,
            numerator,
            denominator,
            beats_per_measure,
            total_beats: beats_per_measure * measures as f64,
            items,
        }
    }

    /// Override the loop length in beats (scores may store it explicitly).
    pub fn with_total_beats(mut self, total_beats: f64) -> Self {
        self.total_beats = total_beats;
        self
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Length of one practice loop of this track in seconds.
    pub fn loop_duration_s(&self) -> f64 {
        self.total_beats * self.seconds_per_beat()
    }

    /// Notes only, sorted by beat. Ties keep their input order.
    pub fn notes(&self) -> Vec<&ScoreItem> {
        let mut notes: Vec<&ScoreItem> = self.items.iter().filter(|item| item.is_note()).collect();
        notes.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        notes
    }

    pub fn note_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_note()).count()
    }
}

fn beats_per_measure(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64 * 4.0
}

/// A practice score: the top track and an optional bottom track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Score {
    pub top: Track,
    pub bottom: Option<Track>,
}

impl Score {
    pub fn single(top: Track) -> Self {
        Self { top, bottom: None }
    }

    pub fn dual(top: Track, bottom: Track) -> Self {
        Self {
            top,
            bottom: Some(bottom),
        }
    }

    /// Parse and validate a score from JSON text.
    pub fn from_json(source: &str) -> Result<Self, DrumbotError> {
        let raw: RawScore =
            serde_json::from_str(source).map_err(|e| DrumbotError::Score(e.to_string()))?;
        let score = raw.into_score();
        validate(&score)?;
        Ok(score)
    }

    /// Parse and validate a score from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DrumbotError> {
        let raw: RawScore =
            serde_json::from_value(value).map_err(|e| DrumbotError::Score(e.to_string()))?;
        let score = raw.into_score();
        validate(&score)?;
        Ok(score)
    }

    pub fn track(&self, name: TrackName) -> Option<&Track> {
        match name {
            TrackName::Top => Some(&self.top),
            TrackName::Bottom => self.bottom.as_ref(),
        }
    }

    /// Present tracks in fixed order (top first).
    pub fn tracks(&self) -> impl Iterator<Item = (TrackName, &Track)> {
        std::iter::once((TrackName::Top, &self.top))
            .chain(self.bottom.as_ref().map(|t| (TrackName::Bottom, t)))
    }

    pub fn is_single_actuator(&self) -> bool {
        self.bottom.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct RawScore {
    #[serde(default)]
    top: Option<RawTrack>,
    #[serde(default)]
    bottom: Option<RawTrack>,
}

/// Meter fields are read as numbers of any kind; editors write `3.0` as often as `3`.
#[derive(Debug, Default, Deserialize)]
struct RawTrack {
    bpm: Option<f64>,
    numerator: Option<f64>,
    denominator: Option<f64>,
    measures: Option<f64>,
    beats_per_measure: Option<f64>,
    total_beats: Option<f64>,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RawItem {
    beat: Option<f64>,
    duration: Option<f64>,
    class: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    dotted: Option<bool>,
}

impl RawItem {
    /// Missing beat is 0 and missing duration is one beat. Items without a
    /// known class are dropped.
    fn into_item(self) -> Option<ScoreItem> {
        let class = match self.class.as_deref().map(str::trim) {
            Some(c) if c.eq_ignore_ascii_case("note") => ItemClass::Note,
            Some(c) if c.eq_ignore_ascii_case("rest") => ItemClass::Rest,
            _ => return None,
        };
        Some(ScoreItem {
            beat: self.beat.unwrap_or(0.0),
            duration_beats: self.duration.unwrap_or(1.0),
            class,
            kind: self.kind,
            dotted: self.dotted.unwrap_or(false),
        })
    }
}

/// Whole count from a JSON number. Negative or non-finite values become 0,
/// which `validate` rejects for the meter.
fn count(value: Option<f64>, default: u32) -> u32 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v.round() as u32,
        Some(_) => 0,
        None => default,
    }
}

impl RawScore {
    fn into_score(self) -> Score {
        Score {
            top: self.top.unwrap_or_default().into_track(),
            bottom: self.bottom.map(RawTrack::into_track),
        }
    }
}

impl RawTrack {
    fn into_track(self) -> Track {
        let numerator = count(self.numerator, DEFAULT_NUMERATOR);
        let denominator = count(self.denominator, DEFAULT_DENOMINATOR);
        let measures = count(self.measures, DEFAULT_MEASURES);
        let items = self.items.into_iter().filter_map(RawItem::into_item).collect();
        let mut track = Track::new(self.bpm.unwrap_or(DEFAULT_BPM), numerator, denominator, measures, items);
        if let Some(bpm_measure) = self.beats_per_measure {
            track.beats_per_measure = bpm_measure;
            track.total_beats = bpm_measure * measures as f64;
        }
        if let Some(total) = self.total_beats {
            track.total_beats = total;
        }
        track
    }
}

/// Validate a score for playability.
///
/// Checks, per present track:
/// 1. `bpm` is finite and positive
/// 2. numerator and denominator are at least 1
/// 3. `total_beats` is finite and positive
/// 4. every item has a finite non-negative beat and a positive duration
pub fn validate(score: &Score) -> Result<(), DrumbotError> {
    for (name, track) in score.tracks() {
        validate_track(name, track)?;
    }
    Ok(())
}

fn validate_track(name: TrackName, track: &Track) -> Result<(), DrumbotError> {
    if !track.bpm.is_finite() || track.bpm <= 0.0 {
        return Err(DrumbotError::Score(format!(
            "track '{}': bpm must be positive, got {}",
            name, track.bpm
        )));
    }
    if track.numerator == 0 || track.denominator == 0 {
        return Err(DrumbotError::Score(format!(
            "track '{}': time signature {}/{} is not valid",
            name, track.numerator, track.denominator
        )));
    }
    if !track.total_beats.is_finite() || track.total_beats <= 0.0 {
        return Err(DrumbotError::Score(format!(
            "track '{}': total_beats must be positive, got {}",
            name, track.total_beats
        )));
    }
    for (i, item) in track.items.iter().enumerate() {
        if !item.beat.is_finite() || item.beat < 0.0 {
            return Err(DrumbotError::Score(format!(
                "track '{}' item {}: beat must be >= 0, got {}",
                name, i, item.beat
            )));
        }
        if !item.duration_beats.is_finite() || item.duration_beats <= 0.0 {
            return Err(DrumbotError::Score(format!(
                "track '{}' item {}: duration must be positive, got {}",
                name, i, item.duration_beats
            )));
        }
    }
    Ok(())
}
