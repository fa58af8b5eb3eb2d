//! Interview rules: turn limits, follow-up gating and default titles.

use chrono::NaiveDate;

use crate::models::interview::QuestionType;

/// Answers per interview; submitting this turn ends the session.
pub const MAX_TURNS: i32 = 10;
/// Follow-ups allowed in a row before a fresh base question is forced.
pub const MAX_CONSECUTIVE_FOLLOWUP: i32 = 2;
pub const DEFAULT_TURN_LIMIT_SEC: i32 = 60;
pub const DEFAULT_TOTAL_LIMIT_SEC: i32 = 10 * 60;

/// A follow-up only when the caller asked for one and the streak has room.
pub fn next_question_type(requested_followup: bool, followup_streak: i32) -> QuestionType {
    if requested_followup && followup_streak < MAX_CONSECUTIVE_FOLLOWUP {
        QuestionType::Followup
    } else {
        QuestionType::Base
    }
}

pub fn next_followup_streak(question_type: QuestionType, followup_streak: i32) -> i32 {
    match question_type {
        QuestionType::Followup => (followup_streak + 1).min(MAX_CONSECUTIVE_FOLLOWUP),
        QuestionType::Base => 0,
    }
}

pub fn remaining_followups(followup_streak: i32) -> i32 {
    (MAX_CONSECUTIVE_FOLLOWUP - followup_streak).max(0)
}

/// `YYYY-MM-DD (NN)` where `NN` follows the highest sequence already used that day.
pub fn default_title(date: NaiveDate, existing_titles: &[String]) -> String {
    let prefix = title_prefix(date);
    let max_seq = existing_titles
        .iter()
        .filter_map(|title| {
            title
                .strip_prefix(&prefix)?
                .strip_suffix(')')?
                .parse::<u32>()
                .ok()
        })
        .max()
        .unwrap_or(0);
    format!("{prefix}{:02})", max_seq + 1)
}

/// The part of a default title shared by every session started on `date`.
pub fn title_prefix(date: NaiveDate) -> String {
    format!("{} (", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_followup_requires_request_and_room() {
        assert_eq!(next_question_type(false, 0), QuestionType::Base);
        assert_eq!(next_question_type(true, 0), QuestionType::Followup);
        assert_eq!(next_question_type(true, 1), QuestionType::Followup);
        assert_eq!(next_question_type(true, 2), QuestionType::Base);
    }

    #[test]
    fn test_streak_increments_and_resets() {
        assert_eq!(next_followup_streak(QuestionType::Followup, 0), 1);
        assert_eq!(next_followup_streak(QuestionType::Followup, 1), 2);
        assert_eq!(next_followup_streak(QuestionType::Base, 2), 0);
    }

    #[test]
    fn test_streak_never_leaves_range() {
        for streak in 0..=MAX_CONSECUTIVE_FOLLOWUP {
            for requested in [false, true] {
                let kind = next_question_type(requested, streak);
                let next = next_followup_streak(kind, streak);
                assert!((0..=MAX_CONSECUTIVE_FOLLOWUP).contains(&next));
            }
        }
    }

    #[test]
    fn test_remaining_followups() {
        assert_eq!(remaining_followups(0), 2);
        assert_eq!(remaining_followups(2), 0);
        assert_eq!(remaining_followups(5), 0);
    }

    #[test]
    fn test_default_title_sequences_per_day() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(default_title(date, &[]), "2026-10-18 (01)");

        let existing = vec![
            "2026-10-18 (01)".to_string(),
            "2026-10-18 (07)".to_string(),
            "2026-10-18 (custom)".to_string(),
            "2026-10-18 (03) retry".to_string(),
        ];
        assert_eq!(default_title(date, &existing), "2026-10-18 (08)");
    }
}
