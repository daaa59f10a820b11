//! Defensive parsing of generative-oracle output.
//!
//! The oracle is asked for strict JSON but may wrap it in markdown fences,
//! surround it with prose, or ignore the format entirely. Every call site
//! goes through `parse_structured`: strip fences, try JSON, then fall back
//! to a call-site heuristic. Failure is a value, never an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::pipeline::types::NO_CLASS_SENTINEL;

/// Leading enumeration: `1.`, `2)`, `3 -`, `Q4:`, bullets.
static ENUMERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:q)?\s*\d+\s*[.):\-]+|[-*•–])\s*").expect("enumeration regex is valid")
});

/// A double-quoted string ending in `?`.
static QUOTED_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*\?)\s*""#).expect("quoted question regex is valid")
});

/// "no class" / "no_class" / "no-class" as whole words.
static NO_CLASS_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bno[\s_\-]+class\b").expect("sentinel regex is valid")
});

/// Bare confidences at or above this are read as percentages.
const PERCENT_FLOOR: f64 = 2.0;

/// How a response was understood.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    /// Well-formed JSON matching the expected shape.
    Structured(T),
    /// JSON failed; a call-site heuristic recovered a value from free text.
    Heuristic(T),
    /// Nothing usable.
    Unparseable { reason: String },
}

impl<T> ParseOutcome<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Self::Structured(v) | Self::Heuristic(v) => Some(v),
            Self::Unparseable { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::Heuristic(_) => "heuristic",
            Self::Unparseable { .. } => "unparseable",
        }
    }
}

/// Parse `raw` as `T`, falling back to `heuristic` on the fence-stripped text.
pub fn parse_structured<T, F>(raw: &str, heuristic: F) -> ParseOutcome<T>
where
    T: DeserializeOwned,
    F: FnOnce(&str) -> Option<T>,
{
    let unfenced = strip_code_fence(raw);

    match first_json_value::<T>(extract_json_object(unfenced)) {
        Ok(value) => ParseOutcome::Structured(value),
        Err(e) => match heuristic(unfenced) {
            Some(value) => ParseOutcome::Heuristic(value),
            None => ParseOutcome::Unparseable {
                reason: format!("JSON parse error: {e}"),
            },
        },
    }
}

/// Deserialize the first complete JSON value in `text`, ignoring whatever follows it.
fn first_json_value<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    match serde_json::Deserializer::from_str(text).into_iter::<T>().next() {
        Some(result) => result,
        None => serde_json::from_str(text),
    }
}

/// Remove a surrounding markdown code fence (with optional language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the language tag, if any, up to the first newline.
    let body_start = match after_open.find('\n') {
        Some(nl) if !after_open[..nl].contains('{') && !after_open[..nl].contains('[') => nl + 1,
        _ => 0,
    };
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Skip leading prose up to the first JSON opener.
///
/// Text after the payload is left in place; only the first complete value is
/// ever deserialized.
pub fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }

    match trimmed.find('{') {
        Some(start) => &trimmed[start..],
        None => trimmed,
    }
}

// ── Classification verdicts ─────────────────────────────────────────

/// `{label, confidence, reasoning}` as returned by the oracle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Verdict {
    #[serde(default, alias = "class", alias = "ticket_class")]
    pub label: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default, alias = "rationale", alias = "explanation")]
    pub reasoning: Option<String>,
}

impl Verdict {
    pub fn new(label: Option<String>, confidence: Option<f32>, reasoning: Option<String>) -> Self {
        Self {
            label,
            confidence: confidence.map(|c| serde_json::json!(c)),
            reasoning,
        }
    }

    /// Non-blank label, trimmed.
    pub fn label(&self) -> Option<&str> {
        self.label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// Confidence in [0, 1]. Accepts numbers, numeric strings, and
    /// percentages (`"87%"`, or a bare number in [2, 100]). Values just
    /// above 1 are overshoot and clamp to 1.
    pub fn confidence(&self) -> Option<f32> {
        let raw = match self.confidence.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => {
                let s = s.trim();
                match s.strip_suffix('%') {
                    Some(pct) => pct.trim().parse::<f64>().ok()? / 100.0,
                    None => s.parse::<f64>().ok()?,
                }
            }
            _ => return None,
        };
        if !raw.is_finite() {
            return None;
        }
        let scaled = if (PERCENT_FLOOR..=100.0).contains(&raw) { raw / 100.0 } else { raw };
        Some(scaled.clamp(0.0, 1.0) as f32)
    }
}

/// Recover the "no class" sentinel from free text.
pub fn sentinel_heuristic(text: &str) -> Option<Verdict> {
    if NO_CLASS_PHRASE.is_match(text) {
        Some(Verdict::new(
            Some(NO_CLASS_SENTINEL.to_string()),
            Some(0.0),
            Some("class not determined".to_string()),
        ))
    } else {
        None
    }
}

/// Parse a classification verdict with the sentinel fallback.
pub fn parse_verdict(raw: &str) -> ParseOutcome<Verdict> {
    parse_structured(raw, sentinel_heuristic)
}

// ── Questions ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionsPayload {
    Object { questions: Vec<String> },
    List(Vec<String>),
}

/// Parse a question list: JSON first, then question-looking lines.
pub fn parse_questions(raw: &str) -> ParseOutcome<Vec<String>> {
    let outcome = parse_structured(raw, |text| {
        let lines = question_lines(text);
        if lines.is_empty() {
            None
        } else {
            Some(QuestionsPayload::List(lines))
        }
    });
    match outcome {
        ParseOutcome::Structured(QuestionsPayload::Object { questions })
        | ParseOutcome::Structured(QuestionsPayload::List(questions)) => {
            ParseOutcome::Structured(questions)
        }
        ParseOutcome::Heuristic(QuestionsPayload::Object { questions })
        | ParseOutcome::Heuristic(QuestionsPayload::List(questions)) => {
            ParseOutcome::Heuristic(questions)
        }
        ParseOutcome::Unparseable { reason } => ParseOutcome::Unparseable { reason },
    }
}

/// Question candidates from free text: quoted strings when the text looks like
/// broken JSON, otherwise non-empty lines containing `?`.
pub fn question_lines(text: &str) -> Vec<String> {
    let quoted: Vec<String> = QUOTED_QUESTION
        .captures_iter(text)
        .map(|c| {
            let unescaped = serde_json::from_str::<String>(&c[0]).unwrap_or_else(|_| c[1].to_string());
            clean_question(&unescaped)
        })
        .filter(|q| !q.is_empty())
        .collect();
    if !quoted.is_empty() && looks_like_json(text) {
        return quoted;
    }

    text.lines()
        .filter(|line| line.contains('?'))
        .map(clean_question)
        .filter(|q| !q.is_empty() && !q.starts_with(['{', '[']))
        .collect()
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Strip enumeration, quotes and trailing commas from one question.
pub fn clean_question(line: &str) -> String {
    let trimmed = line
        .trim()
        .trim_end_matches(',')
        .trim()
        .trim_matches('"')
        .trim();
    ENUMERATION.replace(trimmed, "").trim().to_string()
}

// ── Normalized text ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NormalizedPayload {
    #[serde(alias = "normalized_text", alias = "corrected_text", alias = "result")]
    text: String,
}

/// Parse a normalization reply: `{"text": ...}` or the plain reply itself.
pub fn parse_normalized(raw: &str) -> ParseOutcome<String> {
    let outcome = parse_structured(raw, |text| {
        let text = text.trim();
        if text.is_empty() || text.starts_with('{') {
            None
        } else {
            Some(NormalizedPayload {
                text: text.to_string(),
            })
        }
    });
    match outcome {
        ParseOutcome::Structured(p) if !p.text.trim().is_empty() => {
            ParseOutcome::Structured(p.text.trim().to_string())
        }
        ParseOutcome::Structured(_) => ParseOutcome::Unparseable {
            reason: "empty text field".to_string(),
        },
        ParseOutcome::Heuristic(p) => ParseOutcome::Heuristic(p.text),
        ParseOutcome::Unparseable { reason } => ParseOutcome::Unparseable { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Fences and extraction ───────────────────────────────────────

    #[test]
    fn strip_fence_with_language_tag() {
        let raw = "```json\n{\"label\": \"access\"}\n```";
        assert_eq!(strip_code_fence(raw), "{\"label\": \"access\"}");
    }

    #[test]
    fn strip_fence_without_language_tag() {
        let raw = "```\n{\"label\": \"access\"}\n```";
        assert_eq!(strip_code_fence(raw), "{\"label\": \"access\"}");
    }

    #[test]
    fn strip_fence_inline_json() {
        let raw = "```{\"label\": \"access\"}```";
        assert_eq!(strip_code_fence(raw), "{\"label\": \"access\"}");
    }

    #[test]
    fn strip_fence_unclosed() {
        let raw = "```json\n{\"label\": \"access\"}";
        assert_eq!(strip_code_fence(raw), "{\"label\": \"access\"}");
    }

    #[test]
    fn no_fence_is_trimmed_passthrough() {
        assert_eq!(strip_code_fence("  plain text \n"), "plain text");
    }

    #[test]
    fn extract_json_skips_leading_prose() {
        let input = "My analysis: {\"label\": \"mail\", \"confidence\": 0.7} done.";
        assert_eq!(
            extract_json_object(input),
            "{\"label\": \"mail\", \"confidence\": 0.7} done."
        );
        assert_eq!(extract_json_object("  [1, 2] ok"), "[1, 2] ok");
    }

    #[test]
    fn json_followed_by_prose_is_structured() {
        let raw = "{\"label\": \"access\", \"confidence\": 0.8}\nHope this helps! {not json}";
        let outcome = parse_verdict(raw);
        let ParseOutcome::Structured(v) = outcome else {
            panic!("expected structured, got {outcome:?}");
        };
        assert_eq!(v.label(), Some("access"));
        assert!((v.confidence().unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn prose_json_prose_is_structured() {
        let raw = "Result: {\"label\": \"mail\", \"confidence\": 0.7} and that's it }";
        let outcome = parse_verdict(raw);
        assert!(matches!(outcome, ParseOutcome::Structured(ref v) if v.label() == Some("mail")));
    }

    #[test]
    fn array_followed_by_prose_is_structured() {
        let outcome = parse_questions("[\"Which room?\", \"Since when?\"]\nThat's all.");
        assert_eq!(
            outcome,
            ParseOutcome::Structured(vec!["Which room?".to_string(), "Since when?".to_string()])
        );
    }

    // ── Verdicts ────────────────────────────────────────────────────

    #[test]
    fn verdict_structured() {
        let outcome = parse_verdict(
            r#"{"label": "access", "confidence": 0.8, "reasoning": "password reset"}"#,
        );
        let ParseOutcome::Structured(v) = outcome else {
            panic!("expected structured, got {outcome:?}");
        };
        assert_eq!(v.label(), Some("access"));
        assert!((v.confidence().unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(v.reasoning.as_deref(), Some("password reset"));
    }

    #[test]
    fn verdict_accepts_class_alias_and_fences() {
        let raw = "Here you go:\n```json\n{\"class\": \"net_setup\", \"confidence\": 0.93}\n```";
        let v = parse_verdict(raw).value().unwrap();
        assert_eq!(v.label(), Some("net_setup"));
        assert!((v.confidence().unwrap() - 0.93).abs() < 1e-6);
    }

    #[test]
    fn verdict_confidence_forms() {
        let pct = parse_verdict(r#"{"label": "a", "confidence": "87%"}"#).value().unwrap();
        assert!((pct.confidence().unwrap() - 0.87).abs() < 1e-6);

        let hundred = parse_verdict(r#"{"label": "a", "confidence": 95}"#).value().unwrap();
        assert!((hundred.confidence().unwrap() - 0.95).abs() < 1e-6);

        let string = parse_verdict(r#"{"label": "a", "confidence": "0.5"}"#).value().unwrap();
        assert!((string.confidence().unwrap() - 0.5).abs() < 1e-6);

        let clamped = parse_verdict(r#"{"label": "a", "confidence": -3}"#).value().unwrap();
        assert_eq!(clamped.confidence(), Some(0.0));

        let junk = parse_verdict(r#"{"label": "a", "confidence": "high"}"#).value().unwrap();
        assert_eq!(junk.confidence(), None);
    }

    #[test]
    fn slight_overshoot_clamps_to_one() {
        let over = parse_verdict(r#"{"label": "a", "confidence": 1.5}"#).value().unwrap();
        assert_eq!(over.confidence(), Some(1.0));

        let pct = parse_verdict(r#"{"label": "a", "confidence": 2}"#).value().unwrap();
        assert!((pct.confidence().unwrap() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn verdict_sentinel_heuristic_on_free_text() {
        let outcome = parse_verdict("I think there is no class that fits this ticket.");
        let ParseOutcome::Heuristic(v) = outcome else {
            panic!("expected heuristic, got {outcome:?}");
        };
        assert_eq!(v.label(), Some(NO_CLASS_SENTINEL));
        assert_eq!(v.confidence(), Some(0.0));
    }

    #[test]
    fn sentinel_heuristic_needs_whole_words() {
        assert!(sentinel_heuristic("Answer: NO-CLASS").is_some());
        assert!(sentinel_heuristic("label no_class, sorry").is_some());
        assert!(sentinel_heuristic("There is no classroom projector.").is_none());
        assert!(sentinel_heuristic("no classification possible").is_none());
    }

    #[test]
    fn verdict_unparseable_free_text() {
        let outcome = parse_verdict("Sorry, I cannot help with that right now.");
        assert!(matches!(outcome, ParseOutcome::Unparseable { .. }));
        assert_eq!(outcome.label(), "unparseable");
    }

    #[test]
    fn verdict_blank_label_is_none() {
        let v = parse_verdict(r#"{"label": "   ", "confidence": 0.99}"#).value().unwrap();
        assert_eq!(v.label(), None);
    }

    // ── Questions ───────────────────────────────────────────────────

    #[test]
    fn questions_from_json_object() {
        let raw = r#"{"questions": ["Which room?", "Since when?", "Which device?"]}"#;
        let outcome = parse_questions(raw);
        assert!(matches!(outcome, ParseOutcome::Structured(ref q) if q.len() == 3));
    }

    #[test]
    fn questions_from_bare_array_in_fence() {
        let raw = "```json\n[\"Which room?\", \"Since when?\"]\n```";
        let questions = parse_questions(raw).value().unwrap();
        assert_eq!(questions, vec!["Which room?", "Since when?"]);
    }

    #[test]
    fn questions_from_numbered_lines() {
        let raw = "Here are some questions:\n1. Which room are you in?\n2) When did it start?\n\nThanks!\n- Is it every device?";
        let outcome = parse_questions(raw);
        let ParseOutcome::Heuristic(questions) = outcome else {
            panic!("expected heuristic, got {outcome:?}");
        };
        assert_eq!(
            questions,
            vec![
                "Which room are you in?",
                "When did it start?",
                "Is it every device?"
            ]
        );
    }

    #[test]
    fn questions_from_broken_json_lines() {
        let raw = "{\n  \"questions\": [\n    \"Which room?\",\n    \"Since when?\",\n";
        let questions = parse_questions(raw).value().unwrap();
        assert_eq!(questions, vec!["Which room?", "Since when?"]);
    }

    #[test]
    fn questions_from_one_line_broken_json() {
        let raw = r#"{"questions": ["Which room?", "Since when?", "Which device?",]}"#;
        let outcome = parse_questions(raw);
        let ParseOutcome::Heuristic(questions) = outcome else {
            panic!("expected heuristic, got {outcome:?}");
        };
        assert_eq!(questions, vec!["Which room?", "Since when?", "Which device?"]);
    }

    #[test]
    fn quoted_questions_are_unescaped() {
        let raw = r#"["Is the \"Guest\" network visible?", "Which floor?""#;
        let questions = parse_questions(raw).value().unwrap();
        assert_eq!(questions, vec!["Is the \"Guest\" network visible?", "Which floor?"]);
    }

    #[test]
    fn questions_unparseable_without_question_marks() {
        assert!(parse_questions("I have no questions.").value().is_none());
    }

    #[test]
    fn clean_question_keeps_leading_digits_in_words() {
        assert_eq!(clean_question("2FA prompt appears?"), "2FA prompt appears?");
        assert_eq!(clean_question("Q3: Which floor?"), "Which floor?");
        assert_eq!(clean_question("  \"Which floor?\", "), "Which floor?");
    }

    // ── Normalized text ─────────────────────────────────────────────

    #[test]
    fn normalized_from_json() {
        let outcome = parse_normalized(r#"{"text": "virtual private network is down"}"#);
        assert_eq!(
            outcome,
            ParseOutcome::Structured("virtual private network is down".to_string())
        );
    }

    #[test]
    fn normalized_from_plain_text_in_fence() {
        let outcome = parse_normalized("```\nprinter on floor 2 is jammed\n```");
        assert_eq!(
            outcome,
            ParseOutcome::Heuristic("printer on floor 2 is jammed".to_string())
        );
    }

    #[test]
    fn normalized_empty_is_unparseable() {
        assert!(parse_normalized("   ").value().is_none());
        assert!(parse_normalized(r#"{"text": ""}"#).value().is_none());
    }
}
