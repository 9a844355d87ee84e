//! Queue priority for a request.
//!
//! Someone who is struggling should not wait behind a routine request, so
//! low mood, low energy and repeated give-ups on the same task all raise
//! the score. Higher runs sooner.

use crate::types::{AssistRequest, EncouragementContext, EnergyLevel};

/// Priority of an ordinary request.
pub const BASE_PRIORITY: u32 = 1;

/// Failed attempts beyond this stop adding priority.
const MAX_ATTEMPT_BOOST: u32 = 3;

pub fn priority_for(request: &AssistRequest) -> u32 {
    match request {
        AssistRequest::Shrink(req) => {
            let mut score = BASE_PRIORITY;
            if req.mood.is_some_and(|m| m.is_struggling()) {
                score += 2;
            }
            if req.energy == Some(EnergyLevel::Low) {
                score += 1;
            }
            score + req.failed_attempts.min(MAX_ATTEMPT_BOOST)
        }
        AssistRequest::Encourage(req) => {
            let mut score = BASE_PRIORITY;
            if matches!(
                req.context,
                EncouragementContext::Struggling
                    | EncouragementContext::TaskAbandoned
                    | EncouragementContext::StreakBroken
            ) {
                score += 2;
            }
            if req.mood.is_some_and(|m| m.is_struggling()) {
                score += 1;
            }
            score
        }
    }
}
