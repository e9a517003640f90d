#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, ObjectClass};
use crate::geometry::BoundingBox;
use crate::suppress::greedy_nms;

/// Tract-based YOLOv8 detector.
///
/// Expects a single `[1, 3, S, S]` float input and a `[1, 4 + classes, anchors]`
/// output of center/size boxes followed by per-class scores.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded detector model {} ({}x{})",
            model_path.display(),
            input_size,
            input_size
        );
        Ok(Self { model, input_size })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let side = self.input_size as usize;
        let resized = image::imageops::resize(
            image,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );
        tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        source_width: u32,
        source_height: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("detector output was not rank 3")?;
        let (batch, rows, anchors) = view.dim();
        if batch != 1 || rows <= 4 {
            return Err(anyhow!(
                "unexpected detector output shape [{}, {}, {}]",
                batch,
                rows,
                anchors
            ));
        }
        let sx = source_width as f32 / self.input_size as f32;
        let sy = source_height as f32 / self.input_size as f32;

        let mut out = Vec::new();
        for a in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for row in 4..rows {
                let score = view[[0, row, a]];
                if score > best_score {
                    best_score = score;
                    best_class = row - 4;
                }
            }
            if best_score < confidence_threshold {
                continue;
            }
            let (cx, cy) = (view[[0, 0, a]], view[[0, 1, a]]);
            let (w, h) = (view[[0, 2, a]], view[[0, 3, a]]);
            let x0 = ((cx - w / 2.0) * sx).clamp(0.0, source_width as f32);
            let y0 = ((cy - h / 2.0) * sy).clamp(0.0, source_height as f32);
            let x1 = ((cx + w / 2.0) * sx).clamp(0.0, source_width as f32);
            let y1 = ((cy + h / 2.0) * sy).clamp(0.0, source_height as f32);
            // Degenerate after truncation: nothing to crop.
            let Ok(bbox) = BoundingBox::from_xyxy_f32(x0, y0, x1, y1) else {
                continue;
            };
            out.push(Detection::new(
                bbox,
                best_score.min(1.0),
                ObjectClass::from_coco_id(best_class),
            ));
        }
        Ok(out)
    }
}

/// Per-class greedy IoU filtering, the detector's own pass.
fn filter_per_class(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut classes: Vec<ObjectClass> = Vec::new();
    for d in &detections {
        if !classes.contains(&d.class) {
            classes.push(d.class);
        }
    }

    let mut kept = Vec::with_capacity(detections.len());
    for class in classes {
        let group: Vec<&Detection> = detections.iter().filter(|d| d.class == class).collect();
        let boxes: Vec<BoundingBox> = group.iter().map(|d| d.bbox).collect();
        let scores: Vec<f32> = group.iter().map(|d| d.confidence).collect();
        kept.extend(
            greedy_nms(&boxes, &scores, iou_threshold)
                .into_iter()
                .map(|i| *group[i]),
        );
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let raw = self.decode(outputs, image.width(), image.height(), confidence_threshold)?;
        log::debug!("detector produced {} raw candidates", raw.len());
        Ok(filter_per_class(raw, iou_threshold))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank, 1.1, 0.5).map(|_| ())
    }
}
