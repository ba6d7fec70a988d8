//! Scripted scoring oracle and LLM.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::port::outbound::llm::Completion;
use crate::port::{Llm, ScoreResponse, ScoringOracle, ScoringRequest};

/// What the oracle does on one call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Score(f64),
    /// Return an error.
    Fail(String),
    /// Sleep before answering with the score.
    Slow(Duration, f64),
}

/// Oracle answering from a script, then repeating a fallback.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    requests: Mutex<Vec<ScoringRequest>>,
}

impl ScriptedOracle {
    /// Always answer `score`.
    pub fn fixed(score: f64) -> Self {
        Self::new(Vec::new(), Scripted::Score(score))
    }

    /// Always sleep for `delay` first.
    pub fn slow(delay: Duration) -> Self {
        Self::new(Vec::new(), Scripted::Slow(delay, 1.0))
    }

    /// Always fail.
    pub fn failing() -> Self {
        Self::new(Vec::new(), Scripted::Fail("oracle down".into()))
    }

    pub fn new(script: Vec<Scripted>, fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ScoringRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ScoringOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreResponse> {
        self.requests.lock().push(request.clone());
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Scripted::Score(score) => Ok(ScoreResponse {
                score,
                rationale: "scripted".into(),
            }),
            Scripted::Fail(reason) => Err(Error::Connection(reason)),
            Scripted::Slow(delay, score) => {
                tokio::time::sleep(delay).await;
                Ok(ScoreResponse {
                    score,
                    rationale: "slow".into(),
                })
            }
        }
    }
}

/// LLM returning canned completions and recording prompts.
pub struct MockLlm {
    reply: String,
    prompts: Mutex<Vec<Completion>>,
    calls: AtomicUsize,
}

impl MockLlm {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> Vec<Completion> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Llm for MockLlm {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, completion: &Completion) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(completion.clone());
        Ok(self.reply.clone())
    }
}
