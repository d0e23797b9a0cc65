//! Post-generation item validation.
//!
//! Seventeen rules that catch bad LLM output before it reaches the learner.
//! Rules run in order; the first failure wins and carries the rule label so
//! rejections can be logged and counted.

use std::sync::OnceLock;

use regex::Regex;

use crate::engine::arithmetic::{self, Verification};
use crate::engine::options::{extract_letter, resolve_answer_text, strip_letter_prefix};
use crate::store::operations::items::ItemType;

const MIN_QUESTION_LENGTH: usize = 10;
const MAX_ANSWER_LENGTH: usize = 200;
const MIN_CHOICES: usize = 3;

const PLACEHOLDER_ANSWERS: [&str; 8] = ["", "?", "...", "n/a", "none", "null", "tbd", "unknown"];

const PLACEHOLDER_PATTERNS: [&str; 5] = ["[shows", "[image", "[picture", "[display", "[insert"];

/// Phrases that depend on a visual the system cannot produce.
const VISUAL_CONTEXT_PHRASES: [&str; 12] = [
    "which is longer",
    "which is shorter",
    "which is taller",
    "look at the picture",
    "look at the image",
    "use the graph",
    "use the chart",
    "the figure shows",
    "the picture shows",
    "the diagram shows",
    "shown below",
    "in the image",
];

/// Text renderings of diagrams the learner cannot see.
const DIAGRAM_DESCRIPTION_PHRASES: [&str; 10] = [
    "open circle at",
    "closed circle at",
    "filled circle at",
    "shading to the right",
    "shading to the left",
    "shaded region",
    "shaded to the right",
    "shaded to the left",
    "arrow pointing",
    "number line shows",
];

/// Imperatives that demand learner-drawn output.
const DRAWING_VERBS: [&str; 5] = ["draw", "sketch", "graph", "plot", "shade"];

const BANNED_CHOICES: [&str; 5] = [
    "all of the above",
    "none of the above",
    "all the above",
    "none of these",
    "all of these",
];

const IMPERATIVE_VERBS: [&str; 22] = [
    "simplify",
    "solve",
    "calculate",
    "count",
    "find",
    "convert",
    "round",
    "name",
    "list",
    "spell",
    "write",
    "read",
    "say",
    "translate",
    "match",
    "determine",
    "evaluate",
    "compute",
    "identify",
    "explain",
    "describe",
    "compare",
];

/// Candidate item as produced by the generation pipeline, before acceptance.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub question: String,
    pub correct_answer: String,
    pub options: Option<Vec<String>>,
    pub explanation: Option<String>,
    pub item_type: ItemType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Reject { rule: &'static str, reason: String },
}

impl Verdict {
    fn reject(rule: &'static str, reason: impl Into<String>) -> Self {
        Self::Reject {
            rule,
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Run every rule against a candidate. All must pass.
pub fn validate(candidate: &Candidate) -> Verdict {
    let question = candidate.question.trim();
    let answer = candidate.correct_answer.trim();
    let q_lower = question.to_lowercase();
    let choices = candidate.options.as_deref().unwrap_or(&[]);

    // Rule 1: minimum question length.
    if question.chars().count() < MIN_QUESTION_LENGTH {
        return Verdict::reject(
            "question_length",
            format!(
                "question too short ({} chars, min {MIN_QUESTION_LENGTH})",
                question.chars().count()
            ),
        );
    }

    // Rule 2: answer not empty or a placeholder.
    if PLACEHOLDER_ANSWERS.contains(&answer.to_lowercase().as_str()) {
        return Verdict::reject("placeholder_answer", format!("placeholder answer: {answer:?}"));
    }

    // Rule 3: choices pairwise unique after letter-prefix strip.
    if !choices.is_empty() {
        let mut normalized: Vec<String> = choices
            .iter()
            .map(|c| strip_letter_prefix(c).to_lowercase())
            .collect();
        normalized.sort();
        let before = normalized.len();
        normalized.dedup();
        if normalized.len() != before {
            return Verdict::reject("duplicate_choices", "duplicate choices");
        }
    }

    // Rule 4: the correct answer must resolve into the choices.
    if !choices.is_empty() && !answer_resolves(answer, choices) {
        return Verdict::reject(
            "answer_not_in_choices",
            "correct answer not found in choices",
        );
    }

    // Rule 5: answer given away in the question text.
    let resolved_answer = resolve_answer_text(answer, candidate.options.as_deref());
    let a_lower = resolved_answer.to_lowercase();
    if a_lower.chars().count() > 1
        && q_lower.contains(&a_lower)
        && !giveaway_is_expected(&q_lower)
    {
        return Verdict::reject("answer_giveaway", "answer given away in question text");
    }

    // Rule 6: placeholder markers.
    for pattern in PLACEHOLDER_PATTERNS {
        if q_lower.contains(pattern) {
            return Verdict::reject("placeholder_text", format!("placeholder text: {pattern:?}"));
        }
    }

    // Rule 6b: visual-context phrases.
    for phrase in VISUAL_CONTEXT_PHRASES {
        if q_lower.contains(phrase) {
            return Verdict::reject(
                "visual_context",
                format!("references a visual the item cannot show: {phrase:?}"),
            );
        }
    }

    // Rule 7: answer length cap.
    if answer.chars().count() > MAX_ANSWER_LENGTH {
        return Verdict::reject(
            "answer_length",
            format!(
                "answer too long ({} chars, max {MAX_ANSWER_LENGTH})",
                answer.chars().count()
            ),
        );
    }

    // Rule 8: HTML or fenced-code artifacts.
    if question.contains("</") || question.contains("```") {
        return Verdict::reject("markup_artifacts", "HTML or markdown artifacts in question");
    }
    if answer.contains("</") || answer.contains("```") {
        return Verdict::reject("markup_artifacts", "HTML or markdown artifacts in answer");
    }

    // Rule 9: at least three choices when options are present.
    if !choices.is_empty() && choices.len() < MIN_CHOICES {
        return Verdict::reject(
            "too_few_choices",
            format!("too few choices ({}, min {MIN_CHOICES})", choices.len()),
        );
    }

    // Rule 10: correct choice conspicuously longer than the distractors.
    if !choices.is_empty() {
        let answer_len = resolved_answer.chars().count();
        let distractor_lens: Vec<usize> = choices
            .iter()
            .map(|c| strip_letter_prefix(c))
            .filter(|c| !c.eq_ignore_ascii_case(&resolved_answer))
            .map(|c| c.chars().count())
            .collect();
        if !distractor_lens.is_empty() {
            let avg = distractor_lens.iter().sum::<usize>() as f64 / distractor_lens.len() as f64;
            let max = *distractor_lens.iter().max().unwrap_or(&0);
            if answer_len as f64 >= avg * 3.0 && answer_len >= max + 15 {
                return Verdict::reject(
                    "length_bias",
                    "correct choice much longer than distractors",
                );
            }
        }
    }

    // Rule 11: banned catch-all choices.
    for choice in choices {
        let stripped = strip_letter_prefix(choice).to_lowercase();
        if BANNED_CHOICES.contains(&stripped.as_str()) {
            return Verdict::reject("banned_choice", format!("banned choice: {choice:?}"));
        }
    }

    // Rule 12: question shape — punctuation, blank, or imperative opening.
    let has_punctuation = question.contains('?') || question.contains(':') || question.contains('.');
    let has_blank = question.contains("__");
    let first_word = q_lower
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches(':');
    let has_imperative = IMPERATIVE_VERBS.contains(&first_word);
    if !(has_punctuation || has_blank || has_imperative) {
        return Verdict::reject(
            "question_shape",
            "question lacks punctuation, blank, or imperative verb",
        );
    }

    // Rule 13: independent arithmetic verification.
    if let Verification::Mismatch { computed, stated } =
        arithmetic::verify_answer(question, answer, candidate.options.as_deref())
    {
        return Verdict::reject(
            "arithmetic_mismatch",
            format!("question computes to {computed}, stated answer is {stated}"),
        );
    }

    // Rule 14: explanation's final result must agree with the answer.
    if let Some(explanation) = candidate.explanation.as_deref() {
        if let Some(verdict) = check_explanation_result(explanation, &resolved_answer) {
            return verdict;
        }

        // Rule 15: every "a op b = c" in the explanation must hold.
        if let Some(verdict) = check_explanation_steps(explanation) {
            return verdict;
        }
    }

    // Rule 16: textual descriptions of diagrams.
    for phrase in DIAGRAM_DESCRIPTION_PHRASES {
        if q_lower.contains(phrase) {
            return Verdict::reject(
                "diagram_description",
                format!("describes a diagram in prose: {phrase:?}"),
            );
        }
    }

    // Rule 17: draw/graph/sketch imperatives.
    if DRAWING_VERBS.contains(&first_word) {
        return Verdict::reject(
            "drawing_imperative",
            format!("asks the learner to produce a visual: {first_word:?}"),
        );
    }

    Verdict::Pass
}

/// Rule 4 helper: text match, letter match, or index match.
fn answer_resolves(answer: &str, choices: &[String]) -> bool {
    let answer_lower = answer.trim().to_lowercase();

    let text_match = choices
        .iter()
        .any(|c| c.trim().to_lowercase() == answer_lower)
        || choices
            .iter()
            .any(|c| strip_letter_prefix(c).to_lowercase() == answer_lower);
    if text_match {
        return true;
    }

    if let Some(letter) = extract_letter(answer) {
        let idx = (letter as u8 - b'A') as usize;
        if idx < choices.len() {
            return true;
        }
    }

    false
}

/// Rule 5 exceptions: question shapes where the answer legitimately appears
/// in the text (math expressions, comparisons, classification, what/which).
fn giveaway_is_expected(q_lower: &str) -> bool {
    static MATH_RE: OnceLock<Regex> = OnceLock::new();
    let math_re = MATH_RE
        .get_or_init(|| Regex::new(r"what is\s+[\d\s+\-*/×÷.]+").expect("math giveaway regex"));
    if math_re.is_match(q_lower) {
        return true;
    }

    const COMPARISONS: [&str; 5] = [
        "which is bigger",
        "which is larger",
        "which is smaller",
        "which is greater",
        "which is less",
    ];
    if COMPARISONS.iter().any(|c| q_lower.contains(c)) {
        return true;
    }

    // Classification and identification questions list the answer among
    // the alternatives by construction.
    const OPENERS: [&str; 8] = [
        "is ", "are ", "does ", "do ", "can ", "will ", "what ", "which ",
    ];
    OPENERS.iter().any(|o| q_lower.starts_with(o))
}

fn explanation_result_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:=\s*|to get\s+|which is\s+)(-?\d+(?:\.\d+)?)")
            .expect("explanation result regex")
    })
}

fn explanation_step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)\s*([+\-*/×÷])\s*(\d+(?:\.\d+)?)\s*=\s*(-?\d+(?:\.\d+)?)")
            .expect("explanation step regex")
    })
}

/// Rule 14: the last numeric result stated by the explanation must equal
/// the declared answer (when the answer is numeric at all).
fn check_explanation_result(explanation: &str, resolved_answer: &str) -> Option<Verdict> {
    let answer_num = arithmetic::parse_numeric(resolved_answer)?;
    let last = explanation_result_re()
        .captures_iter(explanation)
        .last()?;
    let result: f64 = last[1].parse().ok()?;
    if arithmetic::numbers_match(result, answer_num) {
        None
    } else {
        Some(Verdict::reject(
            "explanation_result",
            format!("explanation concludes {result}, answer is {answer_num}"),
        ))
    }
}

/// Rule 15: every inline computation in the explanation must be correct.
fn check_explanation_steps(explanation: &str) -> Option<Verdict> {
    for caps in explanation_step_re().captures_iter(explanation) {
        let a: f64 = caps[1].parse().ok()?;
        let op = &caps[2];
        let b: f64 = caps[3].parse().ok()?;
        let c: f64 = caps[4].parse().ok()?;
        let computed = match op {
            "+" => a + b,
            "-" => a - b,
            "*" | "×" => a * b,
            "/" | "÷" => {
                if b == 0.0 {
                    continue;
                }
                a / b
            }
            _ => continue,
        };
        if !arithmetic::numbers_match(computed, c) {
            return Some(Verdict::reject(
                "explanation_step",
                format!("explanation claims {a} {op} {b} = {c}, actual {computed}"),
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(question: &str, answer: &str) -> Candidate {
        Candidate {
            question: question.to_string(),
            correct_answer: answer.to_string(),
            options: None,
            explanation: None,
            item_type: ItemType::ShortAnswer,
        }
    }

    fn mcq(question: &str, answer: &str, options: &[&str]) -> Candidate {
        Candidate {
            question: question.to_string(),
            correct_answer: answer.to_string(),
            options: Some(options.iter().map(|o| o.to_string()).collect()),
            explanation: None,
            item_type: ItemType::Mcq,
        }
    }

    fn rejected_rule(verdict: Verdict) -> &'static str {
        match verdict {
            Verdict::Reject { rule, .. } => rule,
            Verdict::Pass => panic!("expected rejection"),
        }
    }

    #[test]
    fn accepts_reasonable_item() {
        assert!(validate(&candidate("What is 5 + 3?", "8")).is_pass());
    }

    #[test]
    fn rule1_short_question() {
        let verdict = validate(&candidate("2 + 2?", "4"));
        assert_eq!(rejected_rule(verdict), "question_length");
    }

    #[test]
    fn rule2_placeholder_answer() {
        for bad in ["", "?", "...", "N/A", "none", "null"] {
            let verdict = validate(&candidate("What is the capital of France?", bad));
            assert_eq!(rejected_rule(verdict), "placeholder_answer", "answer {bad:?}");
        }
    }

    #[test]
    fn rule3_duplicate_choices() {
        let verdict = validate(&mcq(
            "What is 5 + 3? Choose one.",
            "8",
            &["A) 8", "B) 8", "C) 7", "D) 6"],
        ));
        assert_eq!(rejected_rule(verdict), "duplicate_choices");
    }

    #[test]
    fn rule4_answer_must_resolve() {
        let verdict = validate(&mcq(
            "What is 5 + 3? Choose one.",
            "12",
            &["A) 8", "B) 9", "C) 7", "D) 6"],
        ));
        assert_eq!(rejected_rule(verdict), "answer_not_in_choices");

        assert!(validate(&mcq(
            "What is 5 + 3? Choose one.",
            "A",
            &["A) 8", "B) 9", "C) 7", "D) 6"],
        ))
        .is_pass());
    }

    #[test]
    fn rule5_giveaway_with_math_exception() {
        let verdict = validate(&candidate(
            "The answer to this question is Paris. Where is the Eiffel Tower?",
            "Paris",
        ));
        assert_eq!(rejected_rule(verdict), "answer_giveaway");

        // Math expressions legitimately contain their operands.
        assert!(validate(&candidate("What is 86 - 43?", "43")).is_pass());
        // What/which identification questions are exempt.
        assert!(validate(&candidate("Which season comes after summer? fall or winter", "fall")).is_pass());
    }

    #[test]
    fn rule6_placeholder_markers() {
        let verdict = validate(&candidate("[shows a triangle] How many sides?", "3"));
        assert_eq!(rejected_rule(verdict), "placeholder_text");
    }

    #[test]
    fn rule6b_visual_context() {
        let verdict = validate(&candidate("Look at the picture. How many cats?", "3"));
        assert_eq!(rejected_rule(verdict), "visual_context");

        let verdict = validate(&candidate("Count the apples. Which is longer, A or B?", "A"));
        assert_eq!(rejected_rule(verdict), "visual_context");
    }

    #[test]
    fn rule7_answer_too_long() {
        let verdict = validate(&candidate("Summarize the water cycle briefly.", &"x".repeat(201)));
        assert_eq!(rejected_rule(verdict), "answer_length");
    }

    #[test]
    fn rule8_markup_artifacts() {
        let verdict = validate(&candidate("What is 5 + 3?</div>", "8"));
        assert_eq!(rejected_rule(verdict), "markup_artifacts");

        let verdict = validate(&candidate("What is shown here: ``` 5 ``` plus 3?", "8"));
        assert_eq!(rejected_rule(verdict), "markup_artifacts");
    }

    #[test]
    fn rule9_too_few_choices() {
        let verdict = validate(&mcq("What is 5 + 3? Choose.", "8", &["A) 8", "B) 7"]));
        assert_eq!(rejected_rule(verdict), "too_few_choices");
    }

    #[test]
    fn rule10_length_bias() {
        let verdict = validate(&mcq(
            "Why do leaves change color in autumn?",
            "because chlorophyll breaks down and other pigments show through",
            &[
                "A) because chlorophyll breaks down and other pigments show through",
                "B) wind",
                "C) rain",
                "D) frost",
            ],
        ));
        assert_eq!(rejected_rule(verdict), "length_bias");
    }

    #[test]
    fn rule11_banned_choices() {
        let verdict = validate(&mcq(
            "Which of these is a mammal?",
            "dog",
            &["A) dog", "B) lizard", "C) trout", "D) all of the above"],
        ));
        assert_eq!(rejected_rule(verdict), "banned_choice");
    }

    #[test]
    fn rule12_question_shape() {
        let verdict = validate(&candidate("The number after six", "seven"));
        assert_eq!(rejected_rule(verdict), "question_shape");

        assert!(validate(&candidate("Solve 14 minus 5", "9")).is_pass());
        assert!(validate(&candidate("5 plus __ equals 12", "7")).is_pass());
    }

    #[test]
    fn rule13_arithmetic_mismatch() {
        // "7 less than 15" computes to 8; a declared 9 must not survive.
        let verdict = validate(&candidate("7 less than 15?", "9"));
        assert_eq!(rejected_rule(verdict), "arithmetic_mismatch");

        assert!(validate(&candidate("7 less than 15?", "8")).is_pass());
    }

    #[test]
    fn rule14_explanation_result_disagrees() {
        let mut item = candidate("What is 6 + 7?", "13");
        item.explanation = Some("Add 6 and 7 to get 14".to_string());
        let verdict = validate(&item);
        assert_eq!(rejected_rule(verdict), "explanation_result");

        let mut item = candidate("What is 6 + 7?", "13");
        item.explanation = Some("6 + 7 = 13, which is 13".to_string());
        assert!(validate(&item).is_pass());
    }

    #[test]
    fn rule15_explanation_step_wrong() {
        let mut item = candidate("What is 6 + 7?", "13");
        item.explanation = Some("First 6 + 7 = 12, then add 1 to get 13".to_string());
        let verdict = validate(&item);
        assert_eq!(rejected_rule(verdict), "explanation_step");
    }

    #[test]
    fn rule16_diagram_description() {
        let verdict = validate(&candidate(
            "A number line has an open circle at 3 with shading to the right. What inequality?",
            "x > 3",
        ));
        assert_eq!(rejected_rule(verdict), "diagram_description");
    }

    #[test]
    fn rule17_drawing_imperative() {
        let verdict = validate(&candidate("Draw a rectangle with area 12.", "rectangle"));
        assert_eq!(rejected_rule(verdict), "drawing_imperative");

        let verdict = validate(&candidate("Graph the line y = 2x + 1 on paper.", "line"));
        assert_eq!(rejected_rule(verdict), "drawing_imperative");
    }
}
