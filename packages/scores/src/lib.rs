//! Practice scores bundled with drumbot.
//!
//! Every `scores/*.json` file is embedded at build time and addressed by its
//! file stem, e.g. `tutorial`.

use drumbot_core::DrumbotError;

include!(concat!(env!("OUT_DIR"), "/scores.rs"));

/// An embedded score with its name and JSON source
#[derive(Debug, Clone)]
pub struct DemoScore {
    pub name: String,
    pub content: String,
}

impl DemoScore {
    /// Parse the JSON into a playable score.
    pub fn parse(&self) -> Result<drumbot_core::Score, DrumbotError> {
        drumbot_core::Score::from_json(&self.content)
    }
}

/// Get all embedded scores
pub fn get_all_scores() -> Vec<DemoScore> {
    SCORES
        .iter()
        .map(|(name, content)| DemoScore {
            name: name.to_string(),
            content: content.to_string(),
        })
        .collect()
}

/// Get a score by name
pub fn get_score(name: &str) -> Option<DemoScore> {
    SCORES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(name, content)| DemoScore {
            name: name.to_string(),
            content: content.to_string(),
        })
}

/// List all score names
pub fn list_scores() -> Vec<&'static str> {
    SCORES.iter().map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use drumbot_core::TrackName;

    #[test]
    fn test_every_embedded_score_parses() {
        let scores = get_all_scores();
        assert!(!scores.is_empty());
        for score in scores {
            assert!(score.parse().is_ok(), "{} does not parse", score.name);
        }
    }

    #[test]
    fn test_tutorial_score() {
        let tutorial = get_score("tutorial").unwrap().parse().unwrap();
        assert_eq!(tutorial.top.bpm, 100.0);
        assert_eq!(tutorial.top.total_beats, 4.0);
        assert_eq!(tutorial.top.note_count(), 4);
        assert_eq!(tutorial.track(TrackName::Bottom).unwrap().note_count(), 2);
    }

    #[test]
    fn test_unknown_score() {
        assert!(get_score("does-not-exist").is_none());
        assert!(list_scores().contains(&"tutorial"));
    }
}
