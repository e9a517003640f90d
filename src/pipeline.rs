//! Per-image analysis pipeline.
//!
//! Linear stages, no loops back:
//!
//! ```text
//! Received -> Suppressed -> Classified -> Aggregated -> Annotated -> Finalized
//! ```
//!
//! A run ends in a finalized [`AnalysisResult`] or a single [`AnalysisError`].
//! A detection that fails classification is logged and skipped; it never fails
//! the run. A detector panic is reported as `AnalysisError::Unexpected`
//! tagged with the stage that was running; a classifier panic only skips that
//! person.

use std::fmt;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::sync::PoisonError;

use anyhow::{anyhow, Context};
use image::{ImageFormat, RgbImage};

use crate::aggregate::{Aggregator, LabelCounts};
use crate::annotate::{Annotator, LabelledBox};
use crate::detect::{persons_only, Detection, SharedDetector};
use crate::error::{panic_message, AnalysisError, ClassificationError};
use crate::expression::ExpressionClassifier;
use crate::labels::{remap, ClassroomLabel, Emotion};
use crate::suppress::{greedy_nms, DEFAULT_IOU_THRESHOLD};

/// Default detector confidence floor.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Suppressed,
    Classified,
    Aggregated,
    Annotated,
    Finalized,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Suppressed => "suppressed",
            PipelineStage::Classified => "classified",
            PipelineStage::Aggregated => "aggregated",
            PipelineStage::Annotated => "annotated",
            PipelineStage::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Passed to the detector.
    pub confidence_threshold: f32,
    /// Passed to the detector for its own overlap filtering.
    pub detector_iou_threshold: f32,
    /// Threshold of the pipeline's own suppression pass.
    pub suppression_iou_threshold: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            detector_iou_threshold: DEFAULT_IOU_THRESHOLD,
            suppression_iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

/// What happened to one kept person box.
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    Classified {
        emotion: Emotion,
        label: ClassroomLabel,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionOutcome {
    pub detection: Detection,
    pub classification: Classification,
}

impl DetectionOutcome {
    pub fn label(&self) -> Option<&ClassroomLabel> {
        match &self.classification {
            Classification::Classified { label, .. } => Some(label),
            Classification::Skipped { .. } => None,
        }
    }
}

/// Finalized output of one run. Built once; read-only afterwards.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    person_count: u32,
    label_counts: LabelCounts,
    summary_lines: Vec<String>,
    annotated: RgbImage,
    format: ImageFormat,
    outcomes: Vec<DetectionOutcome>,
}

impl AnalysisResult {
    /// Kept person boxes, whether or not they were classified.
    pub fn person_count(&self) -> u32 {
        self.person_count
    }

    pub fn label_counts(&self) -> &LabelCounts {
        &self.label_counts
    }

    pub fn summary_lines(&self) -> &[String] {
        &self.summary_lines
    }

    pub fn summary_text(&self) -> String {
        self.summary_lines.join("\n")
    }

    pub fn annotated_image(&self) -> &RgbImage {
        &self.annotated
    }

    /// Raster format of the source, reused for the annotated output.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Kept boxes in suppression order with their classification outcome.
    pub fn outcomes(&self) -> &[DetectionOutcome] {
        &self.outcomes
    }

    /// Encodes the annotated image in the source format.
    pub fn encode_annotated(&self) -> anyhow::Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.annotated
            .write_to(&mut buf, self.format)
            .with_context(|| format!("failed to encode annotated image as {:?}", self.format))?;
        Ok(buf.into_inner())
    }
}

/// Orchestrates detection, suppression, classification, counting and drawing.
///
/// Holds shared, read-only model handles; each call runs independently.
pub struct Pipeline {
    detector: SharedDetector,
    classifier: ExpressionClassifier,
    annotator: Annotator,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        detector: SharedDetector,
        classifier: ExpressionClassifier,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            detector,
            classifier,
            annotator: Annotator::default(),
            settings,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Decode `bytes`, detect, and run every stage.
    pub fn analyze(&self, bytes: &[u8]) -> Result<AnalysisResult, AnalysisError> {
        let mut stage = PipelineStage::Received;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let (image, format) = decode(bytes)?;
            let detections = self.detect(&image)?;
            self.run_stages(&image, format, &detections, &mut stage)
        }));
        finish(outcome, stage)
    }

    /// Run every stage after detection on an already decoded image.
    pub fn analyze_detections(
        &self,
        image: &RgbImage,
        format: ImageFormat,
        detections: &[Detection],
    ) -> Result<AnalysisResult, AnalysisError> {
        let mut stage = PipelineStage::Received;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_stages(image, format, detections, &mut stage)
        }));
        finish(outcome, stage)
    }

    /// One inference call under the detector lock. A panic is caught before
    /// the guard drops, so the shared detector is never left poisoned.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, AnalysisError> {
        let mut guard = self.detector.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            guard.detect(
                image,
                self.settings.confidence_threshold,
                self.settings.detector_iou_threshold,
            )
        }));
        match outcome {
            Ok(detections) => detections.map_err(AnalysisError::Detection),
            Err(payload) => Err(AnalysisError::unexpected(
                PipelineStage::Received,
                anyhow!("panic: {}", panic_message(payload.as_ref())),
            )),
        }
    }

    fn run_stages(
        &self,
        image: &RgbImage,
        format: ImageFormat,
        detections: &[Detection],
        stage: &mut PipelineStage,
    ) -> Result<AnalysisResult, AnalysisError> {
        let people = persons_only(detections);
        log::info!(
            "received {} detections, {} person candidates",
            detections.len(),
            people.len()
        );

        advance(stage, PipelineStage::Suppressed);
        let boxes: Vec<_> = people.iter().map(|d| d.bbox).collect();
        let scores: Vec<_> = people.iter().map(|d| d.confidence).collect();
        let kept: Vec<Detection> =
            greedy_nms(&boxes, &scores, self.settings.suppression_iou_threshold)
                .into_iter()
                .map(|i| people[i])
                .collect();
        log::info!("kept {} of {} person boxes", kept.len(), people.len());

        advance(stage, PipelineStage::Classified);
        let mut aggregator = Aggregator::new();
        let mut labelled = Vec::with_capacity(kept.len());
        let mut outcomes = Vec::with_capacity(kept.len());
        for detection in kept {
            aggregator.record_person();
            let classification = match self.classify(image, &detection) {
                Ok(emotion) => {
                    let label = remap(&emotion);
                    aggregator.record_label(label.clone());
                    labelled.push(LabelledBox {
                        bbox: detection.bbox,
                        text: format!("{} {:.2}", label, detection.confidence),
                    });
                    Classification::Classified { emotion, label }
                }
                Err(err) => {
                    log::error!("error analyzing face in {:?}: {}", detection.bbox, err);
                    Classification::Skipped {
                        reason: err.to_string(),
                    }
                }
            };
            outcomes.push(DetectionOutcome {
                detection,
                classification,
            });
        }

        advance(stage, PipelineStage::Aggregated);
        let summary_lines = aggregator.summary_lines();
        let label_counts = aggregator.label_counts();

        advance(stage, PipelineStage::Annotated);
        let annotated = self.annotator.annotate(image, &labelled, &summary_lines);

        advance(stage, PipelineStage::Finalized);
        Ok(AnalysisResult {
            person_count: aggregator.person_count(),
            label_counts,
            summary_lines,
            annotated,
            format,
            outcomes,
        })
    }

    fn classify(
        &self,
        image: &RgbImage,
        detection: &Detection,
    ) -> Result<Emotion, ClassificationError> {
        let (x, y, w, h) = detection
            .bbox
            .clamp_to(image.width(), image.height())
            .ok_or(ClassificationError::EmptyCrop)?;
        let crop = image::imageops::crop_imm(image, x, y, w, h).to_image();
        self.classifier.classify(&crop)
    }
}

fn decode(bytes: &[u8]) -> Result<(RgbImage, ImageFormat), AnalysisError> {
    let format = image::guess_format(bytes).map_err(AnalysisError::ImageDecode)?;
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(AnalysisError::ImageDecode)?
        .to_rgb8();
    log::info!(
        "decoded {}x{} {:?} image",
        image.width(),
        image.height(),
        format
    );
    Ok((image, format))
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    log::debug!("pipeline stage {} -> {}", stage, next);
    *stage = next;
}

fn finish(
    outcome: std::thread::Result<Result<AnalysisResult, AnalysisError>>,
    stage: PipelineStage,
) -> Result<AnalysisResult, AnalysisError> {
    let result = outcome.unwrap_or_else(|payload| {
        Err(AnalysisError::unexpected(
            stage,
            anyhow!("panic: {}", panic_message(payload.as_ref())),
        ))
    });
    if let Err(err) = &result {
        log::error!("error processing image: {}", err);
    }
    result
}
