//! Independent arithmetic verification.
//!
//! Recomputes the answer to an arithmetic question from its text alone and
//! flags items whose declared answer disagrees. When no pattern matches the
//! verifier reports not-applicable and the caller skips the check.

use std::sync::OnceLock;

use regex::Regex;

use crate::engine::options::resolve_answer_text;

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Confirmed,
    Mismatch { computed: f64, stated: f64 },
    NotApplicable,
}

struct Patterns {
    expr: Regex,
    missing: Vec<(Regex, MissingForm)>,
    plus_chain: Regex,
    minus: Regex,
    times: Regex,
    divided_by: Regex,
    add_sum: Regex,
    product: Regex,
    difference: Regex,
    less_than: Regex,
    more_than: Regex,
    subtract_from: Regex,
    multiply_then_divide: Regex,
    divide_then_multiply: Regex,
    word_loss: Regex,
    word_gain: Regex,
    word_depart: Regex,
    number: Regex,
}

/// Which side of the equation the blank sits on, per operator.
#[derive(Debug, Clone, Copy)]
enum MissingForm {
    BlankPlus,
    PlusBlank,
    BlankMinus,
    MinusBlank,
    BlankTimes,
    TimesBlank,
    BlankDiv,
    DivBlank,
}

const NUM: &str = r"(\d+(?:\.\d+)?)";
const BLANK: &str = r"(?:_+|\?)";

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("arithmetic pattern");
        let missing = |p: String, form: MissingForm| (re(&p), form);
        Patterns {
            expr: re(r"(\d+(?:\.\d+)?(?:\s*[+\-*/]\s*\d+(?:\.\d+)?)+)"),
            missing: vec![
                missing(format!(r"{BLANK}\s*\+\s*{NUM}\s*=\s*{NUM}"), MissingForm::BlankPlus),
                missing(format!(r"{NUM}\s*\+\s*{BLANK}\s*=\s*{NUM}"), MissingForm::PlusBlank),
                missing(format!(r"{BLANK}\s*-\s*{NUM}\s*=\s*{NUM}"), MissingForm::BlankMinus),
                missing(format!(r"{NUM}\s*-\s*{BLANK}\s*=\s*{NUM}"), MissingForm::MinusBlank),
                missing(format!(r"{BLANK}\s*\*\s*{NUM}\s*=\s*{NUM}"), MissingForm::BlankTimes),
                missing(format!(r"{NUM}\s*\*\s*{BLANK}\s*=\s*{NUM}"), MissingForm::TimesBlank),
                missing(format!(r"{BLANK}\s*/\s*{NUM}\s*=\s*{NUM}"), MissingForm::BlankDiv),
                missing(format!(r"{NUM}\s*/\s*{BLANK}\s*=\s*{NUM}"), MissingForm::DivBlank),
            ],
            plus_chain: re(r"(\d+(?:\s+plus\s+\d+)+)"),
            minus: re(&format!(r"{NUM}\s+minus\s+{NUM}")),
            times: re(&format!(r"{NUM}\s+times\s+{NUM}")),
            divided_by: re(&format!(r"{NUM}\s+divided\s+by\s+{NUM}")),
            add_sum: re(r"\b(?:add|sum\s+of)\s+(\d+(?:\s*,\s*\d+)*(?:\s*,?\s*and\s+\d+)?)"),
            product: re(&format!(r"product\s+of\s+{NUM}\s+and\s+{NUM}")),
            difference: re(&format!(r"difference\s+(?:between|of)\s+{NUM}\s+and\s+{NUM}")),
            less_than: re(&format!(r"{NUM}\s+less\s+than\s+{NUM}")),
            more_than: re(&format!(r"{NUM}\s+more\s+than\s+{NUM}")),
            subtract_from: re(&format!(r"subtract\s+{NUM}\s+from\s+{NUM}")),
            multiply_then_divide: re(&format!(
                r"multiply(?:ing)?\s+{NUM}\s+by\s+{NUM}.*?divid(?:e|ing|ed)\s+(?:it\s+|the\s+result\s+)?by\s+{NUM}"
            )),
            divide_then_multiply: re(&format!(
                r"divid(?:e|ing)\s+{NUM}\s+by\s+{NUM}.*?multiply(?:ing)?\s+(?:it\s+|the\s+result\s+)?by\s+{NUM}"
            )),
            word_loss: re(&format!(
                r"(?:has|had)\s+{NUM}\b.*?\b(?:eats|ate|gives\s+away|gave\s+away|gives|gave|loses|lost|spends|spent|uses|used|breaks|broke|drops|dropped|sells|sold|donates|donated|shares|shared|throws\s+away|threw\s+away)\s+{NUM}"
            )),
            word_gain: re(&format!(
                r"(?:has|had)\s+{NUM}\b.*?\b(?:gets|got|finds|found|buys|bought|receives|received|adds|added|picks|picked|earns|earned|wins|won)\s+{NUM}"
            )),
            word_depart: re(&format!(
                r"there\s+(?:are|were)\s+{NUM}\b.*?\b{NUM}\s+(?:fly\s+away|flies\s+away|flew\s+away|leave|left|go\s+home|went\s+home|run\s+away|ran\s+away|walk\s+away|walked\s+away|swim\s+away|swam\s+away|hop\s+away|hopped\s+away|drive\s+away|drove\s+away|are\s+eaten)"
            )),
            number: re(r"\d+(?:\.\d+)?"),
        }
    })
}

/// Map unicode operators and dashes to ASCII and lowercase the text.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            '×' => '*',
            '÷' => '/',
            '−' | '–' | '—' => '-',
            _ => c,
        })
        .collect()
}

/// Comparison and ordering questions pick between given values rather than
/// computing one; leave them alone.
fn is_comparison(q: &str) -> bool {
    const MARKERS: [&str; 8] = [
        "which is bigger",
        "which is larger",
        "which is smaller",
        "which is greater",
        "which is less",
        "which is more",
        "compare",
        "order",
    ];
    MARKERS.iter().any(|m| q.contains(m))
}

/// Try to compute the numeric answer from the question text.
/// Returns `None` when the question is not recognizably arithmetic.
pub fn compute_answer(question: &str) -> Option<f64> {
    let q = normalize(question);
    if is_comparison(&q) {
        return None;
    }
    let p = patterns();

    // Direct expressions, standard precedence: "5 + 3 * 2", "12 / 3".
    if let Some(m) = p.expr.find(&q) {
        if let Some(result) = eval_chain(m.as_str()) {
            return Some(result);
        }
    }

    // Missing-number equations: "__ + 4 = 9", "12 - __ = 5".
    for (re, form) in &p.missing {
        if let Some(caps) = re.captures(&q) {
            let a: f64 = caps[1].parse().ok()?;
            let c: f64 = caps[2].parse().ok()?;
            let solved = match form {
                MissingForm::BlankPlus | MissingForm::PlusBlank => Some(c - a),
                MissingForm::BlankMinus => Some(c + a),
                MissingForm::MinusBlank => Some(a - c),
                MissingForm::BlankTimes | MissingForm::TimesBlank => {
                    (a != 0.0).then(|| c / a)
                }
                MissingForm::BlankDiv => Some(c * a),
                MissingForm::DivBlank => (c != 0.0).then(|| a / c),
            };
            if solved.is_some() {
                return solved;
            }
        }
    }

    // Phrased operations.
    if let Some(caps) = p.plus_chain.captures(&q) {
        let sum: f64 = p
            .number
            .find_iter(&caps[1])
            .filter_map(|n| n.as_str().parse::<f64>().ok())
            .sum();
        return Some(sum);
    }
    if let Some(caps) = p.minus.captures(&q) {
        return binop(&caps, |a, b| Some(a - b));
    }
    if let Some(caps) = p.times.captures(&q) {
        return binop(&caps, |a, b| Some(a * b));
    }
    if let Some(caps) = p.divided_by.captures(&q) {
        return binop(&caps, |a, b| (b != 0.0).then(|| a / b));
    }
    if let Some(caps) = p.add_sum.captures(&q) {
        let sum: f64 = p
            .number
            .find_iter(&caps[1])
            .filter_map(|n| n.as_str().parse::<f64>().ok())
            .sum();
        return Some(sum);
    }
    if let Some(caps) = p.product.captures(&q) {
        return binop(&caps, |a, b| Some(a * b));
    }
    if let Some(caps) = p.difference.captures(&q) {
        return binop(&caps, |a, b| Some((a - b).abs()));
    }

    // Reversed phrasings: "7 less than 15" is 15 - 7.
    if let Some(caps) = p.less_than.captures(&q) {
        return binop(&caps, |n, m| Some(m - n));
    }
    if let Some(caps) = p.more_than.captures(&q) {
        return binop(&caps, |n, m| Some(m + n));
    }
    if let Some(caps) = p.subtract_from.captures(&q) {
        return binop(&caps, |n, m| Some(m - n));
    }

    // Multi-step chains.
    if let Some(caps) = p.multiply_then_divide.captures(&q) {
        let a: f64 = caps[1].parse().ok()?;
        let b: f64 = caps[2].parse().ok()?;
        let c: f64 = caps[3].parse().ok()?;
        if c != 0.0 {
            return Some(a * b / c);
        }
    }
    if let Some(caps) = p.divide_then_multiply.captures(&q) {
        let a: f64 = caps[1].parse().ok()?;
        let b: f64 = caps[2].parse().ok()?;
        let c: f64 = caps[3].parse().ok()?;
        if b != 0.0 {
            return Some(a / b * c);
        }
    }

    // Word problems.
    if let Some(caps) = p.word_loss.captures(&q) {
        return binop(&caps, |a, b| Some(a - b));
    }
    if let Some(caps) = p.word_gain.captures(&q) {
        return binop(&caps, |a, b| Some(a + b));
    }
    if let Some(caps) = p.word_depart.captures(&q) {
        return binop(&caps, |a, b| Some(a - b));
    }

    None
}

fn binop(caps: &regex::Captures<'_>, f: impl Fn(f64, f64) -> Option<f64>) -> Option<f64> {
    let a: f64 = caps[1].parse().ok()?;
    let b: f64 = caps[2].parse().ok()?;
    f(a, b)
}

/// Evaluate a flat `a op b op c ...` chain with * and / binding tighter
/// than + and -. Division by zero yields `None`.
fn eval_chain(expr: &str) -> Option<f64> {
    let mut nums: Vec<f64> = Vec::new();
    let mut ops: Vec<char> = Vec::new();
    let mut current = String::new();

    for c in expr.chars() {
        match c {
            '0'..='9' | '.' => current.push(c),
            '+' | '-' | '*' | '/' => {
                if current.is_empty() {
                    return None;
                }
                nums.push(current.parse().ok()?);
                current.clear();
                ops.push(c);
            }
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }
    if current.is_empty() {
        return None;
    }
    nums.push(current.parse().ok()?);
    if nums.len() != ops.len() + 1 {
        return None;
    }

    // First pass folds * and / into their left term.
    let mut terms: Vec<f64> = vec![nums[0]];
    let mut additive_ops: Vec<char> = Vec::new();
    for (op, &n) in ops.iter().zip(&nums[1..]) {
        match op {
            '*' => *terms.last_mut()? *= n,
            '/' => {
                if n == 0.0 {
                    return None;
                }
                *terms.last_mut()? /= n;
            }
            _ => {
                additive_ops.push(*op);
                terms.push(n);
            }
        }
    }

    let mut result = terms[0];
    for (op, &t) in additive_ops.iter().zip(&terms[1..]) {
        match op {
            '+' => result += t,
            '-' => result -= t,
            _ => return None,
        }
    }
    Some(result)
}

/// Parse a declared answer as a number. Handles fractions, thousands
/// separators, and leading currency / trailing percent markers.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let cleaned = text
        .trim()
        .trim_start_matches('$')
        .trim_end_matches('%')
        .replace(',', "");
    let cleaned = cleaned.trim();

    if cleaned.matches('/').count() == 1 {
        let (num, den) = cleaned.split_once('/')?;
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }

    cleaned.parse().ok()
}

/// Verify a declared answer against the recomputed one.
///
/// MCQ letters are resolved through the options first. Integers must match
/// exactly; anything else within 1e-9.
pub fn verify_answer(question: &str, stated: &str, options: Option<&[String]>) -> Verification {
    let resolved = resolve_answer_text(stated, options);

    let Some(stated_num) = parse_numeric(&resolved) else {
        return Verification::NotApplicable;
    };
    let Some(computed) = compute_answer(question) else {
        return Verification::NotApplicable;
    };

    if numbers_match(computed, stated_num) {
        Verification::Confirmed
    } else {
        Verification::Mismatch {
            computed,
            stated: stated_num,
        }
    }
}

pub fn numbers_match(a: f64, b: f64) -> bool {
    let both_integral = a.fract().abs() < f64::EPSILON && b.fract().abs() < f64::EPSILON;
    if both_integral {
        a == b
    } else {
        (a - b).abs() < 1e-9
    }
}
