//! Result shapes returned to callers

use serde::{Deserialize, Serialize};

/// Difficulty tier of a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Lenient label parsing; unknown labels map to `Easy`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "medium" | "moderate" => Difficulty::Medium,
            "hard" | "difficult" => Difficulty::Hard,
            _ => Difficulty::Easy,
        }
    }
}

/// One smaller step of a shrunk task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShrinkStep {
    pub action: String,
    pub estimated_minutes: u32,
    pub difficulty: Difficulty,
}

impl ShrinkStep {
    pub fn new(action: impl Into<String>, estimated_minutes: u32, difficulty: Difficulty) -> Self {
        Self {
            action: action.into(),
            estimated_minutes,
            difficulty,
        }
    }
}

/// A task broken down into ordered, smaller steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShrinkResult {
    pub original_task: String,
    #[serde(rename = "shrunkTasks")]
    pub steps: Vec<ShrinkStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encouragement: Option<String>,
}

impl ShrinkResult {
    /// Conservative single-step answer used when a provider reply is unusable.
    pub fn fallback(original_task: impl Into<String>) -> Self {
        Self {
            original_task: original_task.into(),
            steps: vec![ShrinkStep::new(
                "Spend five minutes on the very first part",
                5,
                Difficulty::Easy,
            )],
            reasoning: None,
            encouragement: Some("Starting small still counts.".to_string()),
        }
    }

    pub fn total_minutes(&self) -> u32 {
        self.steps.iter().map(|s| s.estimated_minutes).sum()
    }
}

/// Emotional register of an encouragement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Gentle,
    Celebratory,
    Motivating,
    Calm,
    Playful,
}

impl Tone {
    /// Lenient label parsing; unknown labels map to `Gentle`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "celebratory" | "celebrating" => Tone::Celebratory,
            "motivating" | "motivational" | "energetic" => Tone::Motivating,
            "calm" | "calming" => Tone::Calm,
            "playful" | "fun" => Tone::Playful,
            _ => Tone::Gentle,
        }
    }
}

/// A short encouraging message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encouragement {
    pub message: String,
    pub tone: Tone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl Encouragement {
    pub fn fallback() -> Self {
        Self {
            message: "You're doing better than you think. One small step at a time.".to_string(),
            tone: Tone::Gentle,
            emoji: None,
        }
    }
}

/// Response to an [`AssistRequest`](super::AssistRequest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssistResponse {
    Shrink(ShrinkResult),
    Encouragement(Encouragement),
}
