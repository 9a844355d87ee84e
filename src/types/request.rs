//! Request payloads submitted by the task manager.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{NudgeError, Result};

/// How the user says they are feeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Great,
    Good,
    Okay,
    Low,
    Overwhelmed,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Great => "great",
            Mood::Good => "good",
            Mood::Okay => "okay",
            Mood::Low => "low",
            Mood::Overwhelmed => "overwhelmed",
        }
    }

    /// Moods that should jump the queue under load.
    pub fn is_struggling(&self) -> bool {
        matches!(self, Mood::Low | Mood::Overwhelmed)
    }
}

/// Self-reported energy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

impl EnergyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyLevel::High => "high",
            EnergyLevel::Medium => "medium",
            EnergyLevel::Low => "low",
        }
    }
}

/// Ask a provider to break a task into smaller steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShrinkRequest {
    pub task_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<EnergyLevel>,
    /// How many times the user has already given up on this task.
    #[serde(default)]
    pub failed_attempts: u32,
}

impl ShrinkRequest {
    pub fn new(task_title: impl Into<String>) -> Self {
        Self {
            task_title: task_title.into(),
            context: None,
            available_minutes: None,
            mood: None,
            energy: None,
            failed_attempts: 0,
        }
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn available_minutes(mut self, minutes: u32) -> Self {
        self.available_minutes = Some(minutes);
        self
    }

    pub fn mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    pub fn energy(mut self, energy: EnergyLevel) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn failed_attempts(mut self, attempts: u32) -> Self {
        self.failed_attempts = attempts;
        self
    }
}

/// The moment in the user's day that prompted an encouragement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncouragementContext {
    TaskStarted,
    TaskCompleted,
    TaskAbandoned,
    StreakMilestone,
    StreakBroken,
    Struggling,
    DailyCheckIn,
}

impl EncouragementContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncouragementContext::TaskStarted => "task_started",
            EncouragementContext::TaskCompleted => "task_completed",
            EncouragementContext::TaskAbandoned => "task_abandoned",
            EncouragementContext::StreakMilestone => "streak_milestone",
            EncouragementContext::StreakBroken => "streak_broken",
            EncouragementContext::Struggling => "struggling",
            EncouragementContext::DailyCheckIn => "daily_check_in",
        }
    }
}

/// Ask a provider for a short encouraging message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncouragementRequest {
    pub context: EncouragementContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak_days: Option<u32>,
}

impl EncouragementRequest {
    pub fn new(context: EncouragementContext) -> Self {
        Self {
            context,
            mood: None,
            task_title: None,
            streak_days: None,
        }
    }

    pub fn mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    pub fn task_title(mut self, title: impl Into<String>) -> Self {
        self.task_title = Some(title.into());
        self
    }

    pub fn streak_days(mut self, days: u32) -> Self {
        self.streak_days = Some(days);
        self
    }

    /// Exact cache key: the same context and mood always share an answer.
    pub fn cache_key(&self) -> String {
        let mood = self.mood.map(|m| m.as_str()).unwrap_or("unknown");
        format!("{} {}", self.context.as_str(), mood)
    }
}

/// Kind of work a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Shrink,
    Encourage,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Shrink => "shrink",
            RequestKind::Encourage => "encourage",
        }
    }

    /// Fixed (input, output) token guesses used for the pre-flight budget check.
    pub fn placeholder_tokens(&self) -> (u32, u32) {
        match self {
            RequestKind::Shrink => (500, 400),
            RequestKind::Encourage => (200, 100),
        }
    }
}

/// Any request the orchestrator can route to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssistRequest {
    Shrink(ShrinkRequest),
    Encourage(EncouragementRequest),
}

impl AssistRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            AssistRequest::Shrink(_) => RequestKind::Shrink,
            AssistRequest::Encourage(_) => RequestKind::Encourage,
        }
    }

    /// Reject payloads no provider could do anything useful with.
    pub fn validate(&self) -> Result<()> {
        match self {
            AssistRequest::Shrink(req) if req.task_title.trim().is_empty() => Err(
                NudgeError::InvalidInput("task title must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

impl From<ShrinkRequest> for AssistRequest {
    fn from(req: ShrinkRequest) -> Self {
        AssistRequest::Shrink(req)
    }
}

impl From<EncouragementRequest> for AssistRequest {
    fn from(req: EncouragementRequest) -> Self {
        AssistRequest::Encourage(req)
    }
}

impl FromStr for Mood {
    type Err = NudgeError;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase();
        [Mood::Great, Mood::Good, Mood::Okay, Mood::Low, Mood::Overwhelmed]
            .into_iter()
            .find(|m| m.as_str() == label)
            .ok_or_else(|| NudgeError::InvalidInput(format!("unknown mood '{s}'")))
    }
}

impl FromStr for EnergyLevel {
    type Err = NudgeError;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase();
        [EnergyLevel::High, EnergyLevel::Medium, EnergyLevel::Low]
            .into_iter()
            .find(|e| e.as_str() == label)
            .ok_or_else(|| NudgeError::InvalidInput(format!("unknown energy level '{s}'")))
    }
}

impl FromStr for EncouragementContext {
    type Err = NudgeError;

    /// Accepts `snake_case` or `kebab-case`.
    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase().replace('-', "_");
        [
            EncouragementContext::TaskStarted,
            EncouragementContext::TaskCompleted,
            EncouragementContext::TaskAbandoned,
            EncouragementContext::StreakMilestone,
            EncouragementContext::StreakBroken,
            EncouragementContext::Struggling,
            EncouragementContext::DailyCheckIn,
        ]
        .into_iter()
        .find(|c| c.as_str() == label)
        .ok_or_else(|| NudgeError::InvalidInput(format!("unknown context '{s}'")))
    }
}
