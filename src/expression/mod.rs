//! Facial expression classification.
//!
//! `ExpressionBackend` is the capability contract for an external per-face
//! emotion model. `ExpressionClassifier` adapts its output into an [`Emotion`]
//! and owns the lock that serializes access to the shared model.
//!
//! [`Emotion`]: crate::labels::Emotion

mod adapter;
mod backend;
pub mod backends;

pub use adapter::ExpressionClassifier;
pub use backend::{EmotionAnalysis, EmotionScores, ExpressionBackend, SharedExpressionBackend};
pub use backends::StubExpressionBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractExpressionBackend;
