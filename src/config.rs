use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::MoodTag;

/// Heuristic inputs for the risk classifier: which moods count as negative
/// and which message phrases demand immediate attention. Kept as loaded data
/// rather than literals so deployments can localize the keyword list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub negative_moods: Vec<MoodTag>,
    pub danger_keywords: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            negative_moods: vec![MoodTag::Sad, MoodTag::Angry, MoodTag::Tired],
            // Phrase list from the original Vietnamese deployment: self-harm,
            // suicidal ideation, dropping out, self-hatred.
            danger_keywords: [
                "tự tử",
                "tự hại",
                "không muốn sống",
                "muốn chết",
                "tự sát",
                "giết mình",
                "chán sống",
                "bỏ học",
                "bỏ đi",
                "ghét bản thân",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl RiskConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read risk config {}", path.display()))?;
        let config: RiskConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid risk config {}", path.display()))?;
        Ok(config)
    }

    pub fn is_negative(&self, mood: MoodTag) -> bool {
        self.negative_moods.contains(&mood)
    }

    /// Case-insensitive containment scan; empty messages never match.
    pub fn matches_danger_keyword(&self, message: &str) -> bool {
        if message.trim().is_empty() {
            return false;
        }
        let lowered = message.to_lowercase();
        self.danger_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.to_lowercase().as_str()))
    }
}
