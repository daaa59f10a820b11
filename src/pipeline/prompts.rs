//! Prompt text for the generative oracle.

use std::path::Path;

use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::pipeline::types::{AnswerSet, CandidateLabel, NO_CLASS_SENTINEL, QuestionSet};

/// Instruction for the normalization call.
pub const NORMALIZE_SYSTEM_PROMPT: &str = r#"You clean up IT support tickets before they are classified.

Expand abbreviations and acronyms, fix obvious typos, and keep the meaning unchanged.
Do not answer the ticket, do not add details, do not translate.

Respond with ONLY a JSON object:
{"text": "the corrected ticket text"}"#;

/// Instruction for the question-generation call.
pub const QUESTION_SYSTEM_PROMPT: &str = r#"You are an experienced IT support engineer.

A support operator will read your questions to the requester over the phone to
find out which kind of work the ticket needs.

Rules:
1. Ask between 3 and 5 questions
2. Each question must be concrete and help tell candidate work types apart
3. Use plain language a non-technical person understands
4. Ask one thing per question

Respond with ONLY a JSON object:
{"questions": ["First question?", "Second question?", "Third question?"]}"#;

/// Catalog-grounded system prompt for classification calls.
pub fn classifier_system_prompt(catalog: &Catalog) -> String {
    format!(
        "You classify IT support tickets into exactly one work type.\n\n\
         Known work types:\n{listing}\n\
         Answer with the work type id, never its name. If no work type fits, \
         answer with the label \"{NO_CLASS_SENTINEL}\".\n\
         Confidence is your probability, between 0 and 1, that the label is correct.",
        listing = catalog.prompt_listing(),
    )
}

/// Classifier system prompt from `path`, or the catalog-built one.
///
/// A missing or unreadable file is logged and ignored.
pub fn load_classifier_prompt(path: Option<&Path>, catalog: &Catalog) -> String {
    let Some(path) = path else {
        return classifier_system_prompt(catalog);
    };
    match std::fs::read_to_string(path) {
        Ok(prompt) if !prompt.trim().is_empty() => {
            debug!(path = %path.display(), "Loaded classifier prompt override");
            prompt
        }
        Ok(_) => {
            warn!(path = %path.display(), "Classifier prompt override is empty, using catalog prompt");
            classifier_system_prompt(catalog)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Classifier prompt override unreadable, using catalog prompt");
            classifier_system_prompt(catalog)
        }
    }
}

const VERDICT_FORMAT: &str = r#"Respond with ONLY a JSON object:
{"label": "<work type id>", "confidence": 0.0-1.0, "reasoning": "one sentence"}"#;

/// User content for the deep classification call.
pub fn deep_user_prompt(text: &str) -> String {
    format!("Ticket:\n{text}\n\n{VERDICT_FORMAT}")
}

/// User content for the question-generation call.
pub fn question_user_prompt(text: &str, hint: Option<&CandidateLabel>, target: usize) -> String {
    let mut prompt = format!("Ticket:\n{text}\n");
    if let Some(hint) = hint {
        prompt.push_str(&format!(
            "\nAn automatic classifier suggested \"{}\", but with low confidence. \
             Treat it as a guess, not a fact.\n",
            hint.label
        ));
    }
    prompt.push_str(&format!(
        "\nWrite {target} clarifying questions that would pin down the work type."
    ));
    prompt
}

/// Questions and answers paired by position.
pub fn qa_transcript(questions: &QuestionSet, answers: &AnswerSet) -> String {
    questions
        .as_slice()
        .iter()
        .zip(answers.as_slice())
        .map(|(q, a)| format!("Question: {q}\nAnswer: {a}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// User content for the final classification after answers.
pub fn resolve_user_prompt(text: &str, questions: &QuestionSet, answers: &AnswerSet) -> String {
    format!(
        "Original ticket:\n{text}\n\n\
         Additional information from the requester:\n{transcript}\n\n\
         Using all of the above, decide the work type.\n\n{VERDICT_FORMAT}",
        transcript = qa_transcript(questions, answers),
    )
}
