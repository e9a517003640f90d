use std::sync::{Arc, Mutex};

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub type SharedExpressionBackend = Arc<Mutex<dyn ExpressionBackend>>;

/// Raw emotion name to score, in the order the model reported them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionScores(Vec<(String, f32)>);

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a score. Re-inserting a name updates it in place.
    pub fn insert(&mut self, name: impl Into<String>, score: f32) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = score,
            None => self.0.push((name, score)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| *s)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(n, s)| (n.as_str(), *s))
    }

    /// Highest-scoring name. The first listed name wins a tie; NaN never wins.
    pub fn argmax(&self) -> Option<&str> {
        let mut best: Option<(&str, f32)> = None;
        for (name, score) in self.iter() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((name, score)),
            }
        }
        best.map(|(name, _)| name)
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        let mut scores = EmotionScores::new();
        for (name, score) in iter {
            scores.insert(name, score);
        }
        scores
    }
}

/// What a backend returns for one crop: one mapping, or one per face it found.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EmotionAnalysis {
    Single(EmotionScores),
    Multiple(Vec<EmotionScores>),
}

impl EmotionAnalysis {
    /// The mapping to classify: the single result, or the first face found.
    pub fn primary(&self) -> Option<&EmotionScores> {
        match self {
            EmotionAnalysis::Single(scores) => Some(scores),
            EmotionAnalysis::Multiple(faces) => faces.first(),
        }
    }
}

/// Per-face emotion model.
///
/// Implementations must tolerate crops with no clearly visible face: either
/// score the crop anyway or return an empty `Multiple`.
pub trait ExpressionBackend: Send {
    fn name(&self) -> &'static str;

    fn analyze(&mut self, face: &RgbImage) -> Result<EmotionAnalysis>;
}
