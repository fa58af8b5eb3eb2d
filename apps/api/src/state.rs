use std::sync::Arc;

use crate::interview::{InterviewOrchestrator, QueryProjections};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Write side: start, submit turn, regenerate.
    pub orchestrator: Arc<InterviewOrchestrator>,
    /// Read side: report, report list, records, score trend.
    pub projections: Arc<QueryProjections>,
}
