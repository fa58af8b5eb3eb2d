//! Reduces a model reply to a single question.
//!
//! Models asked for "one question" still return lists or several questions
//! in one line often enough that the reply is never used verbatim.

/// Returns the first question contained in `reply`.
///
/// - Text separated by a blank line: keep the first block.
/// - More than two lines: take the first line containing `?` or starting with
///   a `N.` number (else the first non-empty line), drop the numbering and cut
///   after the first `?`.
/// - A single line holding several `?`: cut after the first.
pub fn extract_single_question(reply: &str) -> String {
    let text = reply.trim();

    if let Some((first, _)) = text.split_once("\n\n") {
        return first.trim().to_string();
    }

    if text.split('\n').count() > 2 {
        let lines: Vec<&str> = text.split('\n').filter(|l| !l.trim().is_empty()).collect();
        let chosen = lines
            .iter()
            .find(|l| l.contains('?') || is_numbered(l))
            .or_else(|| lines.first());

        return match chosen {
            Some(line) => cut_after_first_question_mark(strip_numbering(line.trim())),
            None => text.to_string(),
        };
    }

    match text.find('?') {
        Some(pos) if text[pos + 1..].contains('?') => text[..=pos].trim().to_string(),
        _ => text.to_string(),
    }
}

fn is_numbered(line: &str) -> bool {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with('.')
}

fn strip_numbering(line: &str) -> &str {
    if is_numbered(line) {
        let digits = line.chars().take_while(char::is_ascii_digit).count();
        line[digits + 1..].trim_start()
    } else {
        line
    }
}

fn cut_after_first_question_mark(line: &str) -> String {
    match line.find('?') {
        Some(pos) => line[..=pos].trim().to_string(),
        None => line.trim().to_string(),
    }
}
