//! Public types for the Nudge API.

mod request;
mod response;
mod result;

pub use request::{
    AssistRequest, EncouragementContext, EncouragementRequest, EnergyLevel, Mood, RequestKind,
    ShrinkRequest,
};
pub use response::{Generation, StreamEvent, Usage, estimate_tokens};
pub use result::{AssistResponse, Difficulty, Encouragement, ShrinkResult, ShrinkStep, Tone};
