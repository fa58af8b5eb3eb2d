//! Interview sessions: the turn state machine, its rules and the read side.

pub mod handlers;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod projections;

pub use orchestrator::InterviewOrchestrator;
pub use projections::QueryProjections;
