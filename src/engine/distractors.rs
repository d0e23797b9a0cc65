//! Computed MCQ distractors.
//!
//! Distractors are derived from the correct answer locally so they are
//! never wrong answers hallucinated by the LLM: off-by-one slips,
//! doubling/halving errors, swapped values, and nearby numbers.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::options::{sanitize_answer, strip_letter_prefix, MCQ_LETTERS};

const NUM_OPTIONS: usize = 4;

/// Compute plausible wrong answers for a correct answer.
/// Returns `NUM_OPTIONS - 1` distractor strings without letter prefixes.
pub fn compute_distractors(correct_answer: &str) -> Vec<String> {
    let correct = strip_letter_prefix(correct_answer).trim().to_string();

    let mut distractors = match parse_number(&correct) {
        Some(num) => numeric_distractors(num),
        None => text_distractors(&correct),
    };

    distractors.retain(|d| !d.eq_ignore_ascii_case(&correct));
    distractors.dedup();

    let mut attempts = 0;
    while distractors.len() < NUM_OPTIONS - 1 && attempts < 10 {
        let fallback = fallback_distractor(&correct, &distractors);
        if !distractors.contains(&fallback) && fallback != correct {
            distractors.push(fallback);
        }
        attempts += 1;
    }

    let mut rng = rand::thread_rng();
    distractors.shuffle(&mut rng);
    distractors.truncate(NUM_OPTIONS - 1);
    distractors
}

/// Replace a candidate's options with computed distractors and place the
/// correct answer at a random letter. The returned correct answer carries
/// its letter prefix (`"B) 43"`).
pub fn insert_distractors(correct_answer: &str) -> (Vec<String>, String) {
    let correct = sanitize_answer(correct_answer);
    let distractors = compute_distractors(&correct);

    let mut rng = rand::thread_rng();
    let correct_index = rng.gen_range(0..NUM_OPTIONS.min(distractors.len() + 1));

    let mut texts: Vec<String> = Vec::with_capacity(NUM_OPTIONS);
    let mut remaining = distractors.into_iter();
    for slot in 0..NUM_OPTIONS {
        if slot == correct_index {
            texts.push(correct.clone());
        } else if let Some(d) = remaining.next() {
            texts.push(d);
        } else {
            texts.push(fallback_distractor(&correct, &texts));
        }
    }

    let options: Vec<String> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}) {t}", MCQ_LETTERS[i]))
        .collect();
    let labeled_correct = format!("{}) {correct}", MCQ_LETTERS[correct_index]);
    (options, labeled_correct)
}

/// Parse a numeric answer, including simple fractions and powers.
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();

    if text.matches('/').count() == 1 {
        let (num, den) = text.split_once('/')?;
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }

    if let Some((base, exp)) = text.split_once('^') {
        let base: f64 = base.trim().parse().ok()?;
        let exp: f64 = exp.trim().parse().ok()?;
        return Some(base.powf(exp));
    }

    text.parse().ok()
}

fn numeric_distractors(correct: f64) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let is_integer = correct.fract() == 0.0;
    let mut out: Vec<String> = Vec::new();

    // Off-by-one slips, scaled up for bigger numbers.
    let step = if correct.abs() < 10.0 {
        if is_integer {
            1.0
        } else {
            0.5
        }
    } else {
        (correct.abs() * 0.1).floor().max(1.0)
    };

    for delta in [step, -step, step * 2.0, -step * 2.0] {
        push_candidate(&mut out, correct + delta, correct, is_integer);
    }

    // Doubling / halving errors.
    if correct != 0.0 {
        for mult in [2.0, 0.5] {
            push_candidate(&mut out, correct * mult, correct, is_integer);
        }
    }

    // Random nearby values to fill out the pool.
    let spread = correct.abs().max(5.0) as i64;
    for _ in 0..3 {
        let delta = rng.gen_range(-spread..=spread) as f64;
        push_candidate(&mut out, correct + delta, correct, is_integer);
    }

    out
}

fn push_candidate(out: &mut Vec<String>, value: f64, correct: f64, is_integer: bool) {
    if value == correct || value < 0.0 {
        return;
    }
    let formatted = format_number(value, is_integer);
    if !out.contains(&formatted) {
        out.push(formatted);
    }
}

fn format_number(num: f64, is_integer: bool) -> String {
    if is_integer || num.fract() == 0.0 {
        format!("{}", num as i64)
    } else {
        let formatted = format!("{num:.2}");
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn text_distractors(correct: &str) -> Vec<String> {
    let lower = correct.to_lowercase();

    if lower == "true" || lower == "false" {
        return vec![if lower == "true" { "False" } else { "True" }.to_string()];
    }
    if lower == "yes" || lower == "no" {
        return vec![if lower == "yes" { "No" } else { "Yes" }.to_string()];
    }

    const WORD_NUMBERS: [(&str, i64); 10] = [
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
    ];
    if let Some((_, n)) = WORD_NUMBERS.iter().find(|(w, _)| *w == lower) {
        return vec![format!("{}", n + 1), format!("{}", n - 1)];
    }

    Vec::new()
}

fn fallback_distractor(correct: &str, exclude: &[String]) -> String {
    if let Some(num) = parse_number(correct) {
        for delta in [1, 2, 3, 4, -1, -2, -3, -4] {
            let value = num + delta as f64;
            let formatted = format_number(value, num.fract() == 0.0);
            if formatted != correct && !exclude.contains(&formatted) {
                return formatted;
            }
        }
    }

    for fallback in ["0", "maybe", "no", "1", "unknown"] {
        if !fallback.eq_ignore_ascii_case(correct)
            && !exclude.iter().any(|e| e.eq_ignore_ascii_case(fallback))
        {
            return fallback.to_string();
        }
    }

    format!("option-{}", rand::thread_rng().gen_range(1000..9999))
}

#[cfg(test)]
mod tests {
    use crate::engine::options::strip_letter_prefix;

    use super::*;

    #[test]
    fn numeric_distractors_are_distinct_and_nonnegative() {
        for _ in 0..20 {
            let distractors = compute_distractors("8");
            assert_eq!(distractors.len(), 3);
            for d in &distractors {
                assert_ne!(d, "8");
                assert!(d.parse::<f64>().unwrap() >= 0.0);
            }
            let mut sorted = distractors.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
    }

    #[test]
    fn strips_letter_prefix_before_computing() {
        let distractors = compute_distractors("B) 43");
        assert!(!distractors.contains(&"43".to_string()));
    }

    #[test]
    fn boolean_answers_get_opposite() {
        assert_eq!(compute_distractors("True")[..1], ["False".to_string()]);
    }

    #[test]
    fn insert_places_correct_answer_under_its_letter() {
        for _ in 0..20 {
            let (options, labeled) = insert_distractors("43");
            assert_eq!(options.len(), 4);

            let letter = labeled.chars().next().unwrap();
            let idx = (letter as u8 - b'A') as usize;
            assert_eq!(strip_letter_prefix(&options[idx]), "43");
            assert_eq!(strip_letter_prefix(&labeled), "43");

            // No placeholder markers survive insertion.
            for option in &options {
                assert!(!option.contains("alt0"));
            }

            // All four options unique after prefix strip.
            let mut texts: Vec<String> = options
                .iter()
                .map(|o| strip_letter_prefix(o).to_string())
                .collect();
            texts.sort();
            texts.dedup();
            assert_eq!(texts.len(), 4);
        }
    }
}
