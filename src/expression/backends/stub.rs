use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::expression::backend::{EmotionAnalysis, EmotionScores, ExpressionBackend};

/// Stub backend for testing and dry runs.
///
/// Scripted responses are consumed in order; once exhausted, every call gets the
/// fallback response (a confident "neutral" unless overridden).
pub struct StubExpressionBackend {
    script: VecDeque<Result<EmotionAnalysis>>,
    fallback: Option<EmotionAnalysis>,
    calls: Arc<AtomicUsize>,
}

impl StubExpressionBackend {
    pub fn new() -> Self {
        let neutral: EmotionScores = [("neutral", 1.0)].into_iter().collect();
        Self {
            script: VecDeque::new(),
            fallback: Some(EmotionAnalysis::Single(neutral)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answer with the same scores.
    pub fn fixed(scores: EmotionScores) -> Self {
        Self {
            fallback: Some(EmotionAnalysis::Single(scores)),
            ..Self::new()
        }
    }

    /// Answer from `script` first, then with "neutral".
    pub fn scripted(script: Vec<Result<EmotionAnalysis>>) -> Self {
        Self {
            script: script.into(),
            ..Self::new()
        }
    }

    /// Fail every call that is not scripted.
    pub fn failing() -> Self {
        Self {
            fallback: None,
            ..Self::new()
        }
    }

    /// Shared counter of `analyze` calls, readable after the backend is moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for StubExpressionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionBackend for StubExpressionBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn analyze(&mut self, _face: &RgbImage) -> Result<EmotionAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| anyhow!("stub expression backend has no response"))
    }
}
