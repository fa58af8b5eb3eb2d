// Prompt text for interview question generation.

use std::fmt::Write;

use super::QuestionRequest;
use crate::llm_client::prompts::SINGLE_QUESTION_INSTRUCTION;

/// Interviewer persona and output-format rules.
pub const QUESTION_SYSTEM: &str = "You are an experienced technical interviewer. \
    You write interview questions that assess a candidate's technical ability.

Principles:
1. Probe real understanding, not memorized definitions.
2. Check conceptual understanding and the ability to apply it.
3. Prefer questions that connect to hands-on experience.
4. Increase difficulty gradually.
5. Be clear and specific.
6. Never repeat a previous question.

Output format:
- Produce exactly one question; never a list.
- Output only the question: no explanation, no numbering, no preamble.
- Keep it to a single concise sentence.
- Example: \"Explain what React's virtual DOM is.\"";

/// Builds the user prompt for one question.
///
/// Follow-ups are anchored on the candidate's last answer; base questions
/// list the previous questions and get a difficulty hint by turn.
pub fn build_question_prompt(request: &QuestionRequest) -> String {
    let mut prompt = format!("Interview topic: {}\n", request.main_topic_id);

    if !request.sub_topic_ids.is_empty() {
        let _ = writeln!(prompt, "Sub-topics: {}", request.sub_topic_ids.join(", "));
    }
    let _ = writeln!(prompt, "Current turn: {}", request.turn_index);

    match request.answer_text.as_deref().filter(|_| request.is_followup) {
        Some(answer) => {
            let _ = write!(
                prompt,
                "\nThe candidate's answer to the previous question:\n{answer}\n\n\
                 Based on that answer, write one follow-up question.\n\
                 - Dig deeper into what the answer covered.\n\
                 - Ask for more detail on something it mentioned, or a closely related advanced point.\n\
                 - Pointing at a gap or weak spot in the answer is also fine.\n"
            );
        }
        None => {
            if !request.previous_questions.is_empty() {
                prompt.push_str("\nPrevious questions:\n");
                for (i, q) in request.previous_questions.iter().enumerate() {
                    let _ = writeln!(prompt, "{}. {}", i + 1, q);
                }
                prompt.push_str("\nWrite a new question that does not overlap with the ones above.\n");
            }

            prompt.push_str(match request.turn_index {
                i32::MIN..=1 => "\nThis is the first question, so start from the fundamentals.",
                2..=3 => "\nThis is an early question, so aim for medium difficulty.",
                _ => "\nAsk an in-depth question that tests deep understanding.",
            });
        }
    }

    prompt.push('\n');
    prompt.push_str(SINGLE_QUESTION_INSTRUCTION);
    prompt
}
