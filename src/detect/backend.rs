use std::sync::{Arc, Mutex};

use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Shared handle to a loaded detector.
///
/// Models are loaded once and shared across analyses. `detect` takes `&mut self`,
/// so callers hold the lock for exactly one inference call.
pub type SharedDetector = Arc<Mutex<dyn DetectorBackend>>;

/// Object detector backend.
///
/// Any inference engine (local model, remote service, stub) can sit behind this
/// trait. Implementations treat the image as read-only.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a decoded image.
    ///
    /// Returns detections of every class the model knows about at or above
    /// `confidence_threshold`, after the backend's own IoU filtering at
    /// `iou_threshold`. Coordinates are in source image pixels.
    fn detect(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
