use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use image::RgbImage;

use crate::error::{panic_message, ClassificationError};
use crate::expression::backend::{ExpressionBackend, SharedExpressionBackend};
use crate::labels::Emotion;

/// Adapter from a raw per-face emotion model to a normalized [`Emotion`].
///
/// Cloning shares the underlying model.
#[derive(Clone)]
pub struct ExpressionClassifier {
    backend: SharedExpressionBackend,
}

impl ExpressionClassifier {
    pub fn new<B: ExpressionBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    pub fn from_shared(backend: SharedExpressionBackend) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> String {
        let guard = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        guard.name().to_string()
    }

    /// Classify one face crop.
    ///
    /// The model lock is held only while `analyze` runs and is released on
    /// every exit path. A panic inside the backend is caught before the guard
    /// drops, so it fails this crop only and the model stays usable.
    pub fn classify(&self, face: &RgbImage) -> Result<Emotion, ClassificationError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(ClassificationError::EmptyCrop);
        }
        let analysis = {
            let mut guard = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
            panic::catch_unwind(AssertUnwindSafe(|| guard.analyze(face)))
                .unwrap_or_else(|payload| {
                    Err(anyhow!("panic: {}", panic_message(payload.as_ref())))
                })
        }
        .map_err(ClassificationError::Backend)?;

        let scores = analysis.primary().ok_or(ClassificationError::NoFace)?;
        let raw = scores.argmax().ok_or(ClassificationError::NoFace)?;
        Ok(Emotion::normalize(raw))
    }
}
