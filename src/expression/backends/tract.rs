#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::expression::backend::{EmotionAnalysis, EmotionScores, ExpressionBackend};

/// FER-style emotion model run through tract.
///
/// Input is a `[1, 1, S, S]` grayscale crop in `0..=255`; the single output holds
/// one logit per label, in the order of `labels`.
pub struct TractExpressionBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    labels: Vec<String>,
}

impl TractExpressionBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("expression model needs at least one label"));
        }
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 1, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded expression model {} ({} labels)",
            model_path.display(),
            labels.len()
        );
        Ok(Self {
            model,
            input_size,
            labels,
        })
    }

    fn build_input(&self, face: &RgbImage) -> Tensor {
        let side = self.input_size as usize;
        let gray = image::imageops::grayscale(face);
        let resized = image::imageops::resize(
            &gray,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );
        tract_ndarray::Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            resized.get_pixel(x as u32, y as u32)[0] as f32
        })
        .into_tensor()
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum::<f32>().max(f32::MIN_POSITIVE);
    exps.iter().map(|v| v / sum).collect()
}

impl ExpressionBackend for TractExpressionBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn analyze(&mut self, face: &RgbImage) -> Result<EmotionAnalysis> {
        let input = self.build_input(face);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let logits: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        if logits.len() != self.labels.len() {
            return Err(anyhow!(
                "model produced {} scores for {} labels",
                logits.len(),
                self.labels.len()
            ));
        }

        let scores: EmotionScores = self
            .labels
            .iter()
            .zip(softmax(&logits))
            .map(|(label, p)| (label.clone(), p * 100.0))
            .collect();
        Ok(EmotionAnalysis::Single(scores))
    }
}
