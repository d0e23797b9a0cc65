//! Local answer grading for MCQ and short-answer items.
//!
//! Returns `(is_correct, is_close)`; "close" drives a gentler UI signal
//! without counting as correct.

use crate::engine::arithmetic::parse_numeric;
use crate::engine::options::{extract_letter, strip_letter_prefix};
use crate::store::operations::items::ItemType;

/// Containment is accepted as correct only when lengths are this similar.
const CONTAINMENT_LENGTH_RATIO: f64 = 0.8;

/// Character-overlap ratio above which a wrong answer counts as close.
const CLOSE_OVERLAP_RATIO: f64 = 0.70;

pub fn check_answer(
    student_answer: &str,
    correct_answer: &str,
    item_type: ItemType,
    options: Option<&[String]>,
) -> (bool, bool) {
    if student_answer.trim().is_empty() || correct_answer.trim().is_empty() {
        return (false, false);
    }

    let student = normalize(student_answer);
    let correct = normalize(correct_answer);

    if item_type == ItemType::Mcq {
        return check_mcq(&student, &correct, options);
    }

    // Exact match after normalization.
    if student == correct {
        return (true, false);
    }

    // Numeric equivalence, with a near-miss band.
    if let (Some(s), Some(c)) = (parse_numeric(&student), parse_numeric(&correct)) {
        if (s - c).abs() < 1e-9 {
            return (true, false);
        }
        if c != 0.0 && ((s - c) / c).abs() < 0.01 {
            return (false, true);
        }
    }

    // Containment with comparable lengths: "4 apples" vs "4 apple".
    if student.contains(&correct) || correct.contains(&student) {
        let min = student.chars().count().min(correct.chars().count()) as f64;
        let max = student.chars().count().max(correct.chars().count()) as f64;
        if max > 0.0 && min / max > CONTAINMENT_LENGTH_RATIO {
            return (true, false);
        }
    }

    (false, is_close(&student, &correct))
}

/// MCQ: resolve both sides to letters where possible and compare those.
fn check_mcq(student: &str, correct: &str, options: Option<&[String]>) -> (bool, bool) {
    let student_letter = resolve_to_letter(student, options);
    let correct_letter = resolve_to_letter(correct, options);

    if let (Some(s), Some(c)) = (student_letter, correct_letter) {
        return (s == c, false);
    }

    (student == correct, false)
}

/// A bare or prefixed letter resolves directly; anything else is matched
/// against the option texts.
fn resolve_to_letter(answer: &str, options: Option<&[String]>) -> Option<char> {
    if let Some(letter) = extract_letter(answer) {
        return Some(letter);
    }

    let options = options?;
    let answer_norm = normalize(answer);
    options
        .iter()
        .position(|o| normalize(strip_letter_prefix(o)) == answer_norm)
        .map(|idx| (b'A' + idx as u8) as char)
}

/// Lowercase, trim, and strip punctuation except `/ % $ . -`.
fn normalize(text: &str) -> String {
    let kept: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '/' | '%' | '$' | '.' | '-'))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-set overlap against the correct answer.
fn is_close(student: &str, correct: &str) -> bool {
    if student.is_empty() || correct.is_empty() {
        return false;
    }
    let student_chars: std::collections::HashSet<char> = student.chars().collect();
    let correct_chars: std::collections::HashSet<char> = correct.chars().collect();
    if correct_chars.is_empty() {
        return false;
    }
    let common = student_chars.intersection(&correct_chars).count();
    common as f64 / correct_chars.len() as f64 > CLOSE_OVERLAP_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec![
            "A) 6".to_string(),
            "B) 7".to_string(),
            "C) 8".to_string(),
            "D) 9".to_string(),
        ]
    }

    #[test]
    fn mcq_letter_vs_letter() {
        assert_eq!(
            check_answer("B", "B", ItemType::Mcq, Some(&options())),
            (true, false)
        );
        assert_eq!(
            check_answer("a", "B", ItemType::Mcq, Some(&options())),
            (false, false)
        );
    }

    #[test]
    fn mcq_text_resolves_to_letter() {
        // The learner types the option text while the key is a letter.
        assert_eq!(
            check_answer("7", "B", ItemType::Mcq, Some(&options())),
            (true, false)
        );
        assert_eq!(
            check_answer("9", "B", ItemType::Mcq, Some(&options())),
            (false, false)
        );
    }

    #[test]
    fn mcq_prefixed_answers() {
        assert_eq!(
            check_answer("B) 7", "B", ItemType::Mcq, Some(&options())),
            (true, false)
        );
        assert_eq!(
            check_answer("7", "B) 7", ItemType::Mcq, Some(&options())),
            (true, false)
        );
    }

    #[test]
    fn short_answer_exact_and_case() {
        assert_eq!(
            check_answer("Paris", "paris", ItemType::ShortAnswer, None),
            (true, false)
        );
    }

    #[test]
    fn short_answer_numeric_tolerance() {
        assert_eq!(
            check_answer("0.5", "1/2", ItemType::ShortAnswer, None),
            (true, false)
        );
        assert_eq!(
            check_answer("1,000", "1000", ItemType::ShortAnswer, None),
            (true, false)
        );
    }

    #[test]
    fn short_answer_numeric_near_miss_is_close() {
        let (correct, close) = check_answer("100.5", "100", ItemType::ShortAnswer, None);
        assert!(!correct);
        assert!(close);
    }

    #[test]
    fn short_answer_containment() {
        assert_eq!(
            check_answer("4 apples", "4 apple", ItemType::ShortAnswer, None),
            (true, false)
        );
        // Containment with very different lengths does not count.
        let (correct, _) =
            check_answer("4", "4 apples and 3 oranges", ItemType::ShortAnswer, None);
        assert!(!correct);
    }

    #[test]
    fn short_answer_overlap_close() {
        let (correct, close) = check_answer("triangel", "triangle", ItemType::ShortAnswer, None);
        assert!(!correct);
        assert!(close);
    }

    #[test]
    fn empty_answers_fail() {
        assert_eq!(
            check_answer("", "8", ItemType::ShortAnswer, None),
            (false, false)
        );
        assert_eq!(
            check_answer("  ", "8", ItemType::Mcq, Some(&options())),
            (false, false)
        );
    }
}
