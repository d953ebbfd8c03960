use serde::Serialize;
use std::path::PathBuf;

use crate::matcher::Match;

/// Outcome of one run, as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub label: String,
    pub similarity: f32,
    pub distance: f32,
    pub capture_attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_image: Option<PathBuf>,
}

impl MatchReport {
    pub fn new(label: impl Into<String>, found: &Match, capture_attempt: u32) -> Self {
        Self {
            label: label.into(),
            similarity: found.similarity,
            distance: found.distance,
            capture_attempt,
            user_image: None,
            match_image: None,
        }
    }

    pub fn to_text(&self) -> String {
        format!(
            "The president you match best with is {}\nYou match with a similarity percentage of: {:.2} percent",
            self.label, self.similarity
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
