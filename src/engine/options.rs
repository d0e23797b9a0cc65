//! MCQ option helpers: letter prefixes, answer resolution, sanitization,
//! and the temporary placeholder options used during validation.

use std::sync::OnceLock;

use regex::Regex;

pub const MCQ_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Maximum answer length carried into placeholder options.
const SANITIZED_ANSWER_CAP: usize = 200;

fn letter_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Da-d][).\s]+").expect("letter prefix regex"))
}

/// Strip a leading `A)` / `b.` style prefix: `"D) 9"` becomes `"9"`.
pub fn strip_letter_prefix(text: &str) -> &str {
    match letter_prefix_re().find(text) {
        Some(m) => text[m.end()..].trim(),
        None => text.trim(),
    }
}

/// Extract a bare letter answer (`"B"`, `"b)"`, `"C. cat"` gives `'C'`).
pub fn extract_letter(text: &str) -> Option<char> {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?.to_ascii_uppercase();
    if !MCQ_LETTERS.contains(&first) {
        return None;
    }
    match chars.next() {
        None => Some(first),
        Some(next) if next == ')' || next == '.' || next.is_whitespace() => Some(first),
        _ => None,
    }
}

/// Resolve an MCQ answer to its text value.
///
/// `"D) 9"` gives `"9"`; a bare `"D"` is looked up in `options`; anything
/// else is returned trimmed.
pub fn resolve_answer_text(answer: &str, options: Option<&[String]>) -> String {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let stripped = strip_letter_prefix(trimmed);
    if !stripped.is_empty() && stripped != trimmed {
        return stripped.to_string();
    }

    if let (Some(options), 1) = (options, trimmed.chars().count()) {
        if let Some(letter) = extract_letter(trimmed) {
            let idx = (letter as u8 - b'A') as usize;
            if let Some(option) = options.get(idx) {
                return strip_letter_prefix(option).to_string();
            }
        }
    }

    trimmed.to_string()
}

/// Sanitize answer text before interpolating it into placeholder options:
/// strip any letter prefix and control characters, cap the length.
pub fn sanitize_answer(text: &str) -> String {
    let stripped = strip_letter_prefix(text);
    let cleaned: String = stripped.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    cleaned.chars().take(SANITIZED_ANSWER_CAP).collect()
}

/// Temporary MCQ options so validation rules that need a choice list have
/// data to check before real distractors are computed. The attempt number
/// keeps placeholders unique across generation retries.
pub fn create_placeholder_options(correct_answer: &str, attempt_num: u32) -> Vec<String> {
    let sanitized = sanitize_answer(correct_answer);
    vec![
        format!("A) {sanitized}"),
        format!("B) alt{attempt_num}a"),
        format!("C) alt{attempt_num}b"),
        format!("D) alt{attempt_num}c"),
    ]
}

/// True if every non-correct option is still a generation placeholder.
pub fn has_placeholder_options(options: &[String]) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^alt\d+[a-c]$").expect("placeholder regex"));
    options
        .iter()
        .filter(|o| re.is_match(strip_letter_prefix(o)))
        .count()
        >= 3
}
