//! Test doubles for the generative and local oracles.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::classifier::{Prediction, TextClassifier};
use crate::error::{ClassifierError, LlmError};
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::pipeline::prompts::{NORMALIZE_SYSTEM_PROMPT, QUESTION_SYSTEM_PROMPT};

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Hang,
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

/// Which stage a request came from, recognized by its prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Normalize,
    Deep,
    Questions,
    Resolve,
}

/// Mock LLM that answers per stage and records every call.
pub struct ScriptedLlm {
    pub normalize: Reply,
    pub deep: Reply,
    pub questions: Reply,
    pub resolve: Reply,
    calls: Mutex<Vec<Call>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    /// Every call fails until scripted.
    pub fn new() -> Self {
        Self {
            normalize: Reply::Fail,
            deep: Reply::Fail,
            questions: Reply::Fail,
            resolve: Reply::Fail,
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn normalize(mut self, reply: Reply) -> Self {
        self.normalize = reply;
        self
    }

    pub fn deep(mut self, reply: Reply) -> Self {
        self.deep = reply;
        self
    }

    pub fn questions(mut self, reply: Reply) -> Self {
        self.questions = reply;
        self
    }

    pub fn resolve(mut self, reply: Reply) -> Self {
        self.resolve = reply;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn classify_call(request: &CompletionRequest) -> Call {
        let system = request.system_prompt();
        if system == NORMALIZE_SYSTEM_PROMPT {
            Call::Normalize
        } else if system == QUESTION_SYSTEM_PROMPT {
            Call::Questions
        } else if request.user_prompt().starts_with("Original ticket:") {
            Call::Resolve
        } else {
            Call::Deep
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let call = Self::classify_call(&request);
        self.calls.lock().unwrap().push(call);
        self.requests.lock().unwrap().push(request);

        let reply = match call {
            Call::Normalize => &self.normalize,
            Call::Deep => &self.deep,
            Call::Questions => &self.questions,
            Call::Resolve => &self.resolve,
        };
        match reply {
            Reply::Text(content) => Ok(CompletionResponse {
                content: content.clone(),
            }),
            Reply::Fail => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "connection refused".into(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hung call should have timed out")
            }
        }
    }
}

/// Local classifier double.
pub enum StubClassifier {
    Predicts { label: String, confidence: f32 },
    Fails,
    Panics,
    Sleeps(Duration),
}

impl StubClassifier {
    pub fn predicts(label: &str, confidence: f32) -> Self {
        Self::Predicts {
            label: label.to_string(),
            confidence,
        }
    }
}

/// Counts calls across a shared stub.
pub struct CountingClassifier {
    pub inner: StubClassifier,
    pub calls: AtomicUsize,
}

impl CountingClassifier {
    pub fn new(inner: StubClassifier) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextClassifier for CountingClassifier {
    fn predict(&self, text: &str) -> Result<Prediction, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict(text)
    }
}

impl TextClassifier for StubClassifier {
    fn predict(&self, _text: &str) -> Result<Prediction, ClassifierError> {
        match self {
            Self::Predicts { label, confidence } => Ok(Prediction {
                label: label.clone(),
                confidence: *confidence,
                distribution: vec![
                    (label.clone(), *confidence),
                    ("other".to_string(), 1.0 - *confidence),
                ],
            }),
            Self::Fails => Err(ClassifierError::Inference("tensor shape error".into())),
            Self::Panics => panic!("inference blew up"),
            Self::Sleeps(d) => {
                std::thread::sleep(*d);
                Err(ClassifierError::Inference("too slow".into()))
            }
        }
    }
}
