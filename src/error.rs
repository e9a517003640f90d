use std::any::Any;

use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Failure of a whole analysis. No partial result accompanies it.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The uploaded bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// The detector backend failed or was unavailable.
    #[error("detection failed: {0:#}")]
    Detection(#[source] anyhow::Error),

    /// Anything else, tagged with the stage it happened in.
    #[error("analysis failed at stage {stage}: {source:#}")]
    Unexpected {
        stage: PipelineStage,
        #[source]
        source: anyhow::Error,
    },
}

impl AnalysisError {
    pub fn unexpected(stage: PipelineStage, source: impl Into<anyhow::Error>) -> Self {
        AnalysisError::Unexpected {
            stage,
            source: source.into(),
        }
    }
}

/// Failure to classify one detection. The detection is skipped, the run continues.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("expression backend error: {0:#}")]
    Backend(#[source] anyhow::Error),

    #[error("no face found in crop")]
    NoFace,

    #[error("detection box lies outside the image")]
    EmptyCrop,
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
