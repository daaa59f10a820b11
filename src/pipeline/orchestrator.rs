//! Drives a ticket through the escalation chain.
//!
//! NORMALIZE → FAST_CLASSIFY → DEEP_CLASSIFY → QUESTION_GENERATION → (pause) → FINALIZE
//!
//! Each gate either stops the run with a confident label or hands off to the
//! next one. Component failures turn into hand-offs; only internal faults
//! reach the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::classifier::LocalModels;
use crate::error::{PipelineError, StageFailure};
use crate::llm::provider::LlmProvider;
use crate::pipeline::deep::{DeepClassifier, DeepConfig};
use crate::pipeline::events::{EventHub, StageEvent};
use crate::pipeline::fast::{FastClassifier, FastConfig};
use crate::pipeline::normalizer::{NormalizerConfig, TextNormalizer};
use crate::pipeline::questions::{QuestionConfig, QuestionGenerator};
use crate::pipeline::types::{
    AnswerSet, AttemptSource, ClassificationAttempt, DEFAULT_CONFIDENCE_THRESHOLD, MAX_QUESTIONS, Outcome,
    PipelineResult, QuestionSet, Step,
};

/// Collaborators, built once at startup and shared by all runs.
pub struct TriageDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub models: LocalModels,
    pub catalog: Arc<Catalog>,
    /// Catalog-grounded classification instructions for the deep and final calls.
    pub classifier_prompt: String,
    pub events: Arc<EventHub>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub threshold: f32,
    pub question_target: usize,
    pub oracle_timeout: Duration,
    pub local_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            question_target: MAX_QUESTIONS,
            oracle_timeout: Duration::from_secs(30),
            local_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Orchestrator {
    normalizer: TextNormalizer,
    fast: FastClassifier,
    deep: DeepClassifier,
    questions: QuestionGenerator,
    catalog: Arc<Catalog>,
    events: Arc<EventHub>,
}

impl Orchestrator {
    pub fn new(deps: TriageDeps, config: OrchestratorConfig) -> Self {
        let normalizer = TextNormalizer::new(
            deps.llm.clone(),
            NormalizerConfig {
                timeout: config.oracle_timeout,
                ..Default::default()
            },
        );
        let fast = FastClassifier::new(
            deps.models,
            FastConfig {
                threshold: config.threshold,
                timeout: config.local_timeout,
            },
        );
        let deep = DeepClassifier::new(
            deps.llm.clone(),
            deps.classifier_prompt.clone(),
            DeepConfig {
                threshold: config.threshold,
                timeout: config.oracle_timeout,
                ..Default::default()
            },
        );
        let questions = QuestionGenerator::new(
            deps.llm,
            deps.classifier_prompt,
            QuestionConfig {
                target: config.question_target,
                timeout: config.oracle_timeout,
                ..Default::default()
            },
        );

        Self {
            normalizer,
            fast,
            deep,
            questions,
            catalog: deps.catalog,
            events: deps.events,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    /// Whether the local models are loaded.
    pub fn fast_ready(&self) -> bool {
        self.fast.is_ready()
    }

    /// Run a ticket until a gate is confident or questions are needed.
    pub async fn classify(&self, text: &str) -> Result<PipelineResult, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyTicket);
        }

        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, len = text.len(), "Classifying ticket");

        // NORMALIZE
        self.events.publish(StageEvent::started(run_id, Step::Normalize));
        let processed_text = self.normalizer.normalize(text).await;
        self.events.publish(StageEvent::finished(run_id, Step::Normalize));

        // FAST_CLASSIFY
        self.events.publish(StageEvent::started(run_id, Step::FastClassify));
        let fast = self.fast.classify(&processed_text).await?;
        self.publish_gate(run_id, Step::FastClassify, &fast);

        if let Some((label, confidence)) = fast.verdict() {
            info!(run_id = %run_id, label, confidence, "Stopped at fast gate");
            let result = PipelineResult {
                outcome: Outcome::MlClassification {
                    label: label.to_string(),
                    confidence,
                },
                processed_text,
                reasoning: "Classified by the local model with high confidence".to_string(),
            };
            return Ok(self.finish(run_id, result));
        }

        // DEEP_CLASSIFY
        self.events.publish(StageEvent::started(run_id, Step::DeepClassify));
        let deep = self.deep.classify(&processed_text).await;
        self.publish_gate(run_id, Step::DeepClassify, &deep);

        if let Some((label, confidence)) = deep.verdict() {
            info!(run_id = %run_id, label, confidence, "Stopped at deep gate");
            let reasoning = match &deep.rationale {
                Some(rationale) => format!("Classified by deep analysis with high confidence: {rationale}"),
                None => "Classified by deep analysis with high confidence".to_string(),
            };
            let result = PipelineResult {
                outcome: Outcome::DeepAnalysis {
                    label: label.to_string(),
                    confidence,
                },
                processed_text,
                reasoning,
            };
            return Ok(self.finish(run_id, result));
        }

        // QUESTION_GENERATION
        let hint = fast.candidate().or_else(|| deep.candidate());
        self.events.publish(StageEvent::started(run_id, Step::QuestionGeneration));
        let questions = self
            .questions
            .generate_questions(&processed_text, hint.as_ref())
            .await;
        self.events.publish(StageEvent::finished(run_id, Step::QuestionGeneration));

        let mut reasoning = match &hint {
            Some(hint) => format!(
                "Not confident enough to classify; best guess '{}' needs confirmation",
                hint.label
            ),
            None => {
                warn!(run_id = %run_id, "{}", StageFailure::AllStagesInconclusive);
                format!("Not confident enough to classify: {}", StageFailure::AllStagesInconclusive)
            }
        };
        let causes = escalation_causes(&[&fast, &deep]);
        if !causes.is_empty() {
            reasoning.push_str(&format!(" ({causes})"));
        }

        info!(
            run_id = %run_id,
            questions = questions.len(),
            hint = hint.as_ref().map(|h| h.label.as_str()).unwrap_or("-"),
            "Paused for clarifying answers"
        );

        let result = PipelineResult {
            outcome: Outcome::QuestionGeneration { questions, hint },
            processed_text,
            reasoning,
        };
        Ok(self.finish(run_id, result))
    }

    /// Final classification with the caller's answers. No threshold applies.
    pub async fn resolve(
        &self,
        text: &str,
        questions: &QuestionSet,
        answers: &AnswerSet,
    ) -> Result<PipelineResult, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyTicket);
        }
        if questions.len() != answers.len() {
            return Err(PipelineError::AnswerCountMismatch {
                questions: questions.len(),
                answers: answers.len(),
            });
        }

        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, answers = answers.len(), "Resolving ticket with answers");

        // FINALIZE
        self.events.publish(StageEvent::started(run_id, Step::Finalize));
        let resolution = self
            .questions
            .resolve_with_answers(text, questions, answers)
            .await;
        self.events.publish(StageEvent::gate_finished(
            run_id,
            Step::Finalize,
            Some(resolution.label.clone()),
            Some(resolution.confidence),
            false,
        ));

        info!(
            run_id = %run_id,
            label = %resolution.label,
            confidence = resolution.confidence,
            "Resolved"
        );

        let reasoning = match resolution.reasoning {
            Some(r) if !r.trim().is_empty() => r,
            _ => "Classified using the answers to clarifying questions".to_string(),
        };
        let result = PipelineResult {
            outcome: Outcome::Completed {
                label: resolution.label,
                confidence: resolution.confidence,
            },
            processed_text: text.to_string(),
            reasoning,
        };
        Ok(self.finish(run_id, result))
    }

    fn publish_gate(&self, run_id: Uuid, step: Step, attempt: &ClassificationAttempt) {
        self.events.publish(StageEvent::gate_finished(
            run_id,
            step,
            attempt.label.clone(),
            attempt.confidence,
            attempt.should_escalate,
        ));
    }

    fn finish(&self, run_id: Uuid, result: PipelineResult) -> PipelineResult {
        self.events
            .publish(StageEvent::completed(run_id, result.to_response()));
        result
    }
}

/// Human-readable escalation causes, e.g. `fast: local classifier models are not loaded`.
fn escalation_causes(attempts: &[&ClassificationAttempt]) -> String {
    attempts
        .iter()
        .filter_map(|a| {
            a.failure.as_ref().map(|f| {
                let source = match a.source {
                    AttemptSource::Fast => "fast",
                    AttemptSource::Deep => "deep",
                };
                format!("{source}: {f}")
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{Call, CountingClassifier, Reply, ScriptedLlm, StubClassifier};
    use crate::pipeline::types::{MIN_QUESTIONS, NO_CLASS_SENTINEL, Stage};

    struct Harness {
        llm: Arc<ScriptedLlm>,
        local: Option<Arc<CountingClassifier>>,
        orchestrator: Orchestrator,
    }

    fn harness(llm: ScriptedLlm, stub: Option<StubClassifier>) -> Harness {
        let llm = Arc::new(llm);
        let local = stub.map(|s| Arc::new(CountingClassifier::new(s)));
        let models = match &local {
            Some(local) => LocalModels::loaded(local.clone()),
            None => LocalModels::unavailable("not loaded in test"),
        };
        let orchestrator = Orchestrator::new(
            TriageDeps {
                llm: llm.clone(),
                models,
                catalog: Arc::new(Catalog::builtin()),
                classifier_prompt: "classify tickets".to_string(),
                events: EventHub::new(),
            },
            OrchestratorConfig {
                oracle_timeout: Duration::from_millis(100),
                local_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );
        Harness {
            llm,
            local,
            orchestrator,
        }
    }

    fn three_questions() -> Reply {
        Reply::text(
            r#"{"questions": ["Which system are you logging into?", "What error do you see?", "Did it work before?"]}"#,
        )
    }

    #[tokio::test]
    async fn confident_fast_gate_skips_deep() {
        let h = harness(
            ScriptedLlm::new().normalize(Reply::text(r#"{"text": "Need a network port in room 204"}"#)),
            Some(StubClassifier::predicts("net_setup", 0.95)),
        );
        let result = h.orchestrator.classify("need net port rm 204").await.unwrap();

        assert_eq!(result.stage(), Stage::MlClassification);
        assert_eq!(
            result.outcome,
            Outcome::MlClassification {
                label: "net_setup".into(),
                confidence: 0.95
            }
        );
        assert_eq!(result.processed_text, "Need a network port in room 204");
        assert_eq!(h.llm.count(Call::Deep), 0);
        assert_eq!(h.llm.count(Call::Questions), 0);
        assert_eq!(h.local.unwrap().calls(), 1);
    }

    #[tokio::test]
    async fn inconclusive_gates_pause_with_fast_hint() {
        let h = harness(
            ScriptedLlm::new()
                .deep(Reply::text(r#"{"label": "web_portal", "confidence": 0.55}"#))
                .questions(three_questions()),
            Some(StubClassifier::predicts("access", 0.40)),
        );
        let result = h.orchestrator.classify("cannot get in").await.unwrap();

        assert_eq!(result.stage(), Stage::QuestionGeneration);
        let Outcome::QuestionGeneration { questions, hint } = &result.outcome else {
            panic!("expected questions, got {:?}", result.outcome);
        };
        assert!((MIN_QUESTIONS..=MAX_QUESTIONS).contains(&questions.len()));
        let hint = hint.as_ref().unwrap();
        assert_eq!(hint.label, "access");
        assert_eq!(hint.confidence, Some(0.40));

        let response = result.to_response();
        assert_eq!(response.ticket_class.as_deref(), Some("access"));
        assert_eq!(response.confidence, Some(0.40));
        assert_eq!(h.llm.count(Call::Deep), 1);

        let question_prompt = h
            .llm
            .requests()
            .into_iter()
            .find(|r| r.system_prompt() == crate::pipeline::prompts::QUESTION_SYSTEM_PROMPT)
            .unwrap()
            .user_prompt();
        assert!(question_prompt.contains("\"access\""));
    }

    #[tokio::test]
    async fn deep_hint_used_when_fast_has_none() {
        let h = harness(
            ScriptedLlm::new()
                .deep(Reply::text(r#"{"label": "mail", "confidence": 0.5}"#))
                .questions(three_questions()),
            None,
        );
        let result = h.orchestrator.classify("mail thing").await.unwrap();
        let Outcome::QuestionGeneration { hint, .. } = &result.outcome else {
            panic!("expected questions");
        };
        assert_eq!(hint.as_ref().unwrap().label, "mail");
        assert!(result.reasoning.contains("local classifier models are not loaded"));
    }

    #[tokio::test]
    async fn confident_deep_gate_stops() {
        let h = harness(
            ScriptedLlm::new().deep(Reply::text(
                r#"{"label": "hw_printer", "confidence": 0.90, "reasoning": "paper jam"}"#,
            )),
            Some(StubClassifier::predicts("hw_printer", 0.70)),
        );
        let result = h.orchestrator.classify("printer jammed").await.unwrap();
        assert_eq!(result.stage(), Stage::DeepAnalysis);
        assert_eq!(
            result.outcome,
            Outcome::DeepAnalysis {
                label: "hw_printer".into(),
                confidence: 0.90
            }
        );
        assert!(result.reasoning.contains("paper jam"));
        assert_eq!(h.llm.count(Call::Questions), 0);
    }

    #[tokio::test]
    async fn confident_sentinel_escalates_to_questions() {
        let h = harness(
            ScriptedLlm::new()
                .deep(Reply::text(format!(
                    r#"{{"label": "{NO_CLASS_SENTINEL}", "confidence": 0.99}}"#
                )))
                .questions(three_questions()),
            Some(StubClassifier::predicts("consult", 0.30)),
        );
        let result = h.orchestrator.classify("something odd").await.unwrap();
        assert_eq!(result.stage(), Stage::QuestionGeneration);
        let Outcome::QuestionGeneration { hint, .. } = &result.outcome else {
            panic!("expected questions");
        };
        assert_eq!(hint.as_ref().unwrap().label, "consult");
    }

    #[tokio::test]
    async fn everything_failing_still_yields_questions() {
        let h = harness(ScriptedLlm::new(), None);
        let result = h.orchestrator.classify("???").await.unwrap();

        assert_eq!(result.stage(), Stage::QuestionGeneration);
        assert_eq!(result.processed_text, "???");
        let Outcome::QuestionGeneration { questions, hint } = &result.outcome else {
            panic!("expected questions");
        };
        assert_eq!(*questions, QuestionSet::fallback());
        assert!(hint.is_none());
        assert!(
            result
                .reasoning
                .contains(&StageFailure::AllStagesInconclusive.to_string())
        );
        assert!(result.to_response().ticket_class.is_none());
    }

    #[tokio::test]
    async fn malformed_deep_output_escalates() {
        let h = harness(
            ScriptedLlm::new()
                .deep(Reply::text("Probably networking, maybe 80% sure"))
                .questions(Reply::text("1. Wired or wireless?\n2. Which building?")),
            None,
        );
        let result = h.orchestrator.classify("net slow").await.unwrap();
        let Outcome::QuestionGeneration { questions, hint } = &result.outcome else {
            panic!("expected questions");
        };
        assert!(hint.is_none());
        assert_eq!(questions.len(), MIN_QUESTIONS);
        assert_eq!(questions.as_slice()[0], "Wired or wireless?");
    }

    #[tokio::test]
    async fn local_panic_is_internal_error() {
        let h = harness(ScriptedLlm::new(), Some(StubClassifier::Panics));
        let err = h.orchestrator.classify("boom").await.unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
        assert_eq!(h.llm.count(Call::Deep), 0);
    }

    #[tokio::test]
    async fn empty_ticket_is_rejected() {
        let h = harness(ScriptedLlm::new(), None);
        assert!(matches!(
            h.orchestrator.classify("   ").await,
            Err(PipelineError::EmptyTicket)
        ));
        assert!(h.llm.calls().is_empty());
    }

    // ── resolve ─────────────────────────────────────────────────────

    fn answered() -> (QuestionSet, AnswerSet) {
        (
            QuestionSet::from_candidates(["Which system?", "What error?", "Did it work before?"])
                .unwrap(),
            AnswerSet::new(vec![
                "Staff portal".into(),
                "Wrong password".into(),
                "Yes, last week".into(),
            ]),
        )
    }

    #[tokio::test]
    async fn resolve_completes_below_threshold() {
        let h = harness(
            ScriptedLlm::new().resolve(Reply::text(
                r#"{"label": "access", "confidence": 0.8, "reasoning": "password reset"}"#,
            )),
            None,
        );
        let (questions, answers) = answered();
        let result = h
            .orchestrator
            .resolve("cannot log in", &questions, &answers)
            .await
            .unwrap();

        assert_eq!(result.stage(), Stage::Completed);
        assert_eq!(
            result.outcome,
            Outcome::Completed {
                label: "access".into(),
                confidence: 0.8
            }
        );
        assert_eq!(result.reasoning, "password reset");
        assert_eq!(result.processed_text, "cannot log in");
    }

    #[tokio::test]
    async fn resolve_is_deterministic_for_fixed_oracle() {
        let h = harness(
            ScriptedLlm::new().resolve(Reply::text(r#"{"label": "access", "confidence": 0.8}"#)),
            None,
        );
        let (questions, answers) = answered();
        let first = h.orchestrator.resolve("x", &questions, &answers).await.unwrap();
        let second = h.orchestrator.resolve("x", &questions, &answers).await.unwrap();
        assert_eq!(first, second);

        let requests = h.llm.requests();
        assert_eq!(requests[0].user_prompt(), requests[1].user_prompt());
    }

    #[tokio::test]
    async fn resolve_failure_is_no_class() {
        let h = harness(ScriptedLlm::new(), None);
        let (questions, answers) = answered();
        let result = h.orchestrator.resolve("x", &questions, &answers).await.unwrap();
        assert_eq!(
            result.outcome,
            Outcome::Completed {
                label: NO_CLASS_SENTINEL.into(),
                confidence: 0.0
            }
        );
    }

    #[tokio::test]
    async fn resolve_rejects_mismatched_answers() {
        let h = harness(ScriptedLlm::new(), None);
        let (questions, _) = answered();
        let answers = AnswerSet::new(vec!["only one".into()]);
        let err = h
            .orchestrator
            .resolve("x", &questions, &answers)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AnswerCountMismatch {
                questions: 3,
                answers: 1
            }
        ));
        assert!(h.llm.calls().is_empty());
    }

    // ── events ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn stage_events_follow_the_run() {
        let h = harness(ScriptedLlm::new(), Some(StubClassifier::predicts("net_setup", 0.97)));
        let mut rx = h.orchestrator.events().subscribe();
        h.orchestrator.classify("net port").await.unwrap();

        let mut steps = Vec::new();
        let mut run_ids = std::collections::HashSet::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                StageEvent::StageStarted { run_id, step, .. } => {
                    run_ids.insert(run_id);
                    steps.push(format!("start:{}", step.as_str()));
                }
                StageEvent::StageFinished { run_id, step, .. } => {
                    run_ids.insert(run_id);
                    steps.push(format!("finish:{}", step.as_str()));
                }
                StageEvent::RunCompleted { run_id, result, .. } => {
                    run_ids.insert(run_id);
                    assert_eq!(result.stage, Stage::MlClassification);
                    steps.push("completed".to_string());
                }
                StageEvent::Pong => {}
            }
        }

        assert_eq!(
            steps,
            [
                "start:normalize",
                "finish:normalize",
                "start:fast_classify",
                "finish:fast_classify",
                "completed"
            ]
        );
        assert_eq!(run_ids.len(), 1);
    }
}
