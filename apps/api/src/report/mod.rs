//! Evaluation reports: prompt, defensive parsing, generation pipeline,
//! background queue and the normalized client view.

pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod queue;
pub mod view;

pub use pipeline::{GenerateOutcome, ReportPipeline};
pub use queue::{ReportQueue, ReportTrigger};
