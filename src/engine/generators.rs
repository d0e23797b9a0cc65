//! Local deterministic item generators.
//!
//! Some concepts can be served without the LLM: clock reading and
//! number-line inequalities get generated locally with an SVG visual.
//! Locally generated items are trusted and skip the LLM validator; they
//! still honor the dedup exclusion sets via the recent-text list.

use std::collections::HashSet;
use std::fmt::Write as _;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::dedup::normalize_text;

const CLOCK_KEYWORDS: [&str; 8] = [
    "clock",
    "telling time",
    "tell time",
    "analog time",
    "read time",
    "reading time",
    "reading clocks",
    "analog clock",
];

const NUMBER_LINE_KEYWORDS: [&str; 4] = [
    "number line",
    "inequality",
    "inequalities",
    "comparing numbers",
];

/// Output of a local generator, shaped like a validated LLM candidate.
#[derive(Debug, Clone)]
pub struct LocalItem {
    pub question: String,
    pub correct_answer: String,
    pub options: Vec<String>,
    pub explanation: String,
    pub svg: String,
}

pub fn is_clock_concept(name: &str, description: &str) -> bool {
    let text = format!("{name} {description}").to_lowercase();
    CLOCK_KEYWORDS.iter().any(|kw| text.contains(kw))
}

pub fn is_number_line_concept(name: &str, description: &str) -> bool {
    let text = format!("{name} {description}").to_lowercase();
    NUMBER_LINE_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// Generate a clock-reading MCQ with an SVG clock face.
///
/// Hour-only vs quarter-hour granularity is inferred from the concept text.
/// The bracketed time marker keeps question texts unique for dedup.
pub fn generate_clock_item(
    name: &str,
    description: &str,
    recent_texts: &[String],
) -> Option<LocalItem> {
    let recent: HashSet<String> = recent_texts.iter().map(|t| normalize_text(t)).collect();
    let text = format!("{name} {description}").to_lowercase();
    let hour_only =
        text.contains("hour") && !text.contains("half") && !text.contains("quarter");

    let mut candidates: Vec<(u32, u32)> = if hour_only {
        (1..=12).map(|h| (h, 0)).collect()
    } else {
        (1..=12)
            .flat_map(|h| [0, 15, 30, 45].map(|m| (h, m)))
            .collect()
    };
    let mut rng = rand::thread_rng();
    candidates.shuffle(&mut rng);

    let (hour, minute) = candidates
        .into_iter()
        .find(|(h, m)| {
            let question = clock_question(&format_clock_time(*h, *m));
            !recent.contains(&normalize_text(&question))
        })?;

    let correct = format_clock_time(hour, minute);
    let mut wrong: HashSet<String> = HashSet::new();
    if hour_only {
        let mut hours: Vec<u32> = (1..=12).filter(|h| *h != hour).collect();
        hours.shuffle(&mut rng);
        for h in hours.into_iter().take(3) {
            wrong.insert(format_clock_time(h, 0));
        }
    } else {
        while wrong.len() < 3 {
            let h = rng.gen_range(1..=12);
            let m = *[0, 15, 30, 45].choose(&mut rng).unwrap_or(&0);
            let t = format_clock_time(h, m);
            if t != correct {
                wrong.insert(t);
            }
        }
    }

    let mut choices: Vec<String> = wrong.into_iter().collect();
    choices.push(correct.clone());
    choices.shuffle(&mut rng);

    let explanation = match minute {
        0 => "Look where the short hand points for the hour. The long hand on 12 means o'clock.",
        15 => "The long hand on 3 means quarter past. The short hand shows the hour.",
        30 => "The long hand on 6 means half past. The short hand shows the hour.",
        _ => "The long hand on 9 means quarter to the next hour.",
    };

    Some(LocalItem {
        question: clock_question(&correct),
        correct_answer: correct.clone(),
        options: choices,
        explanation: explanation.to_string(),
        svg: clock_svg(hour, minute, 200),
    })
}

fn clock_question(time: &str) -> String {
    format!("What time does this clock show? [{time}]")
}

fn format_clock_time(hour: u32, minute: u32) -> String {
    format!("{hour}:{minute:02}")
}

/// Generate a number-comparison MCQ backed by an SVG number line.
pub fn generate_number_line_item(recent_texts: &[String]) -> Option<LocalItem> {
    let recent: HashSet<String> = recent_texts.iter().map(|t| normalize_text(t)).collect();
    let mut rng = rand::thread_rng();

    let mut pairs: Vec<(i32, i32)> = Vec::new();
    for a in 0..=20 {
        for b in 0..=20 {
            if a != b {
                pairs.push((a, b));
            }
        }
    }
    pairs.shuffle(&mut rng);

    let (a, b) = pairs.into_iter().find(|(a, b)| {
        let question = number_line_question(*a, *b);
        !recent.contains(&normalize_text(&question))
    })?;

    let correct = if a < b {
        format!("{a} < {b}")
    } else {
        format!("{a} > {b}")
    };
    let options = vec![
        format!("{a} < {b}"),
        format!("{a} > {b}"),
        format!("{a} = {b}"),
        if a < b {
            format!("{b} < {a}")
        } else {
            format!("{b} > {a}")
        },
    ];

    let explanation = format!(
        "On a number line, values grow from left to right. {} sits to the {} of {}.",
        a,
        if a < b { "left" } else { "right" },
        b
    );

    Some(LocalItem {
        question: number_line_question(a, b),
        correct_answer: correct,
        options,
        explanation,
        svg: number_line_svg(a, b, 400),
    })
}

fn number_line_question(a: i32, b: i32) -> String {
    format!("Which comparison of {a} and {b} is true?")
}

/// Analog clock face: circle, tick marks, hour numbers, both hands.
fn clock_svg(hour: u32, minute: u32, size: u32) -> String {
    let size = size as f64;
    let (cx, cy) = (size / 2.0, size / 2.0);
    let r = size / 2.0 - 10.0;
    let mut svg = String::new();

    let _ = write!(
        svg,
        r#"<svg width="{size}" height="{size}" viewBox="0 0 {size} {size}" xmlns="http://www.w3.org/2000/svg">"#
    );
    let _ = write!(
        svg,
        r##"<circle cx="{cx}" cy="{cy}" r="{r}" fill="white" stroke="#2C3E50" stroke-width="3"/>"##
    );

    for i in 0..12 {
        let angle = (i as f64 * 30.0 - 90.0).to_radians();
        let x1 = cx + (r - 8.0) * angle.cos();
        let y1 = cy + (r - 8.0) * angle.sin();
        let x2 = cx + r * angle.cos();
        let y2 = cy + r * angle.sin();
        let _ = write!(
            svg,
            r##"<line x1="{x1:.1}" y1="{y1:.1}" x2="{x2:.1}" y2="{y2:.1}" stroke="#2C3E50" stroke-width="2"/>"##
        );
    }

    for i in 1..=12 {
        let angle = (i as f64 * 30.0 - 90.0).to_radians();
        let nx = cx + (r - 22.0) * angle.cos();
        let ny = cy + (r - 22.0) * angle.sin();
        let font = (size / 10.0) as u32;
        let _ = write!(
            svg,
            r##"<text x="{nx:.1}" y="{ny:.1}" text-anchor="middle" dominant-baseline="central" font-size="{font}" font-family="sans-serif" fill="#2C3E50">{i}</text>"##
        );
    }

    let minute_angle = (minute as f64 * 6.0 - 90.0).to_radians();
    let minute_len = r - 30.0;
    let mx = cx + minute_len * minute_angle.cos();
    let my = cy + minute_len * minute_angle.sin();
    let _ = write!(
        svg,
        r##"<line x1="{cx}" y1="{cy}" x2="{mx:.1}" y2="{my:.1}" stroke="#2C3E50" stroke-width="2.5" stroke-linecap="round"/>"##
    );

    // Hour hand leans toward the next hour as minutes pass.
    let hour_fraction = hour as f64 + minute as f64 / 60.0;
    let hour_angle = (hour_fraction * 30.0 - 90.0).to_radians();
    let hour_len = r * 0.55;
    let hx = cx + hour_len * hour_angle.cos();
    let hy = cy + hour_len * hour_angle.sin();
    let _ = write!(
        svg,
        r##"<line x1="{cx}" y1="{cy}" x2="{hx:.1}" y2="{hy:.1}" stroke="#2C3E50" stroke-width="4" stroke-linecap="round"/>"##
    );

    let _ = write!(svg, r##"<circle cx="{cx}" cy="{cy}" r="4" fill="#2C3E50"/>"##);
    svg.push_str("</svg>");
    svg
}

/// Number line from 0 to 20 with the two compared values marked.
fn number_line_svg(a: i32, b: i32, width: u32) -> String {
    let width = width as f64;
    let height = 80.0;
    let margin = 20.0;
    let y = height / 2.0;
    let span = width - 2.0 * margin;
    let x_of = |v: i32| margin + span * (v as f64 / 20.0);
    let mut svg = String::new();

    let _ = write!(
        svg,
        r#"<svg width="{width}" height="{height}" viewBox="0 0 {width} {height}" xmlns="http://www.w3.org/2000/svg">"#
    );
    let _ = write!(
        svg,
        r##"<line x1="{margin}" y1="{y}" x2="{:.1}" y2="{y}" stroke="#2C3E50" stroke-width="2"/>"##,
        width - margin
    );

    for v in (0..=20).step_by(5) {
        let x = x_of(v);
        let _ = write!(
            svg,
            r##"<line x1="{x:.1}" y1="{:.1}" x2="{x:.1}" y2="{:.1}" stroke="#2C3E50" stroke-width="2"/>"##,
            y - 6.0,
            y + 6.0
        );
        let _ = write!(
            svg,
            r##"<text x="{x:.1}" y="{:.1}" text-anchor="middle" font-size="12" font-family="sans-serif" fill="#2C3E50">{v}</text>"##,
            y + 24.0
        );
    }

    for (value, color) in [(a, "#2C7BE5"), (b, "#E55353")] {
        let x = x_of(value);
        let _ = write!(svg, r#"<circle cx="{x:.1}" cy="{y}" r="6" fill="{color}"/>"#);
        let _ = write!(
            svg,
            r#"<text x="{x:.1}" y="{:.1}" text-anchor="middle" font-size="12" font-family="sans-serif" fill="{color}">{value}</text>"#,
            y - 14.0
        );
    }

    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_keyword_detection() {
        assert!(is_clock_concept("Reading clocks", ""));
        assert!(is_clock_concept("Time", "telling time to the half hour"));
        assert!(!is_clock_concept("Addition", "adding within 20"));
    }

    #[test]
    fn hour_only_clock_items() {
        let item = generate_clock_item("Clock reading to the hour", "", &[]).unwrap();
        assert!(item.question.starts_with("What time does this clock show?"));
        assert!(item.correct_answer.ends_with(":00"));
        assert_eq!(item.options.len(), 4);
        assert!(item.options.contains(&item.correct_answer));
        assert!(item.svg.starts_with("<svg"));
    }

    #[test]
    fn quarter_hour_clock_items() {
        let item = generate_clock_item("Telling time", "quarter hours", &[]).unwrap();
        let minute: u32 = item
            .correct_answer
            .split(':')
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        assert!([0, 15, 30, 45].contains(&minute));
    }

    #[test]
    fn clock_respects_recent_texts() {
        // Exclude every hour-only time except 7 o'clock.
        let recent: Vec<String> = (1..=12)
            .filter(|h| *h != 7)
            .map(|h| format!("What time does this clock show? [{h}:00]"))
            .collect();
        let item = generate_clock_item("Clock reading to the hour", "", &recent).unwrap();
        assert_eq!(item.correct_answer, "7:00");
    }

    #[test]
    fn clock_exhausted_returns_none() {
        let recent: Vec<String> = (1..=12)
            .map(|h| format!("What time does this clock show? [{h}:00]"))
            .collect();
        assert!(generate_clock_item("Clock reading to the hour", "", &recent).is_none());
    }

    #[test]
    fn number_line_item_is_consistent() {
        let item = generate_number_line_item(&[]).unwrap();
        assert_eq!(item.options.len(), 4);
        assert!(item.options.contains(&item.correct_answer));
        assert!(item.svg.contains("circle"));
    }
}
