//! Prompt construction shared by all backends.

use std::fmt::Write;

use crate::types::{AssistRequest, EncouragementRequest, ShrinkRequest};

const SHRINK_SYSTEM: &str = "You help people who feel stuck start on tasks. \
Break the task into 3 to 6 small, concrete steps, the first one doable in under \
five minutes. Reply with JSON only, in this shape: \
{\"shrunkTasks\":[{\"action\":\"...\",\"estimatedMinutes\":5,\"difficulty\":\"easy|medium|hard\"}],\
\"reasoning\":\"...\",\"encouragement\":\"...\"}";

const ENCOURAGE_SYSTEM: &str = "You write one or two short, warm, honest sentences \
of encouragement. Never guilt the reader. Reply with JSON only, in this shape: \
{\"message\":\"...\",\"tone\":\"gentle|celebratory|motivating|calm|playful\",\"emoji\":\"...\"}";

/// A backend-neutral prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Prompt {
    /// System and user text joined, for single-string backends.
    pub fn combined(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

pub fn build_prompt(request: &AssistRequest) -> Prompt {
    match request {
        AssistRequest::Shrink(req) => Prompt {
            system: SHRINK_SYSTEM.to_string(),
            user: shrink_user(req),
            max_tokens: 600,
            temperature: 0.4,
        },
        AssistRequest::Encourage(req) => Prompt {
            system: ENCOURAGE_SYSTEM.to_string(),
            user: encourage_user(req),
            max_tokens: 150,
            temperature: 0.8,
        },
    }
}

fn shrink_user(req: &ShrinkRequest) -> String {
    let mut out = format!("Task: {}", req.task_title.trim());
    if let Some(context) = &req.context {
        let _ = write!(out, "\nContext: {context}");
    }
    if let Some(minutes) = req.available_minutes {
        let _ = write!(out, "\nTime available: {minutes} minutes");
    }
    if let Some(mood) = req.mood {
        let _ = write!(out, "\nMood: {}", mood.as_str());
    }
    if let Some(energy) = req.energy {
        let _ = write!(out, "\nEnergy: {}", energy.as_str());
    }
    if req.failed_attempts > 0 {
        let _ = write!(
            out,
            "\nThey have tried and stopped {} time(s) before; make the first step tiny.",
            req.failed_attempts
        );
    }
    out
}

fn encourage_user(req: &EncouragementRequest) -> String {
    let mut out = format!("Situation: {}", req.context.as_str().replace('_', " "));
    if let Some(mood) = req.mood {
        let _ = write!(out, "\nMood: {}", mood.as_str());
    }
    if let Some(title) = &req.task_title {
        let _ = write!(out, "\nTask: {title}");
    }
    if let Some(days) = req.streak_days {
        let _ = write!(out, "\nStreak: {days} day(s)");
    }
    out
}
