// Shared prompt constants.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a strict JSON generator. \
    Output a single JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Appended to every question prompt; models tend to list several questions otherwise.
pub const SINGLE_QUESTION_INSTRUCTION: &str =
    "IMPORTANT: Generate exactly ONE question. Do not list multiple questions.";
