//! Axis-aligned box geometry.
//!
//! Boxes use integer pixel coordinates in `xyxy` form. Construction enforces
//! `xmin < xmax` and `ymin < ymax`, so every `BoundingBox` has a positive area.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Integer pixel box, `(xmin, ymin)` inclusive top-left, `(xmax, ymax)` bottom-right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    xmin: i32,
    ymin: i32,
    xmax: i32,
    ymax: i32,
}

impl BoundingBox {
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Result<Self> {
        if xmin >= xmax || ymin >= ymax {
            return Err(anyhow!(
                "degenerate box ({}, {}, {}, {}): expected xmin < xmax and ymin < ymax",
                xmin,
                ymin,
                xmax,
                ymax
            ));
        }
        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    /// Builds a box from floating-point detector output.
    ///
    /// Coordinates are truncated toward zero, matching how detector tensors are
    /// usually cast to pixel indices.
    pub fn from_xyxy_f32(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Result<Self> {
        if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
            return Err(anyhow!("non-finite box coordinates"));
        }
        Self::new(xmin as i32, ymin as i32, xmax as i32, ymax as i32)
    }

    pub fn xmin(&self) -> i32 {
        self.xmin
    }

    pub fn ymin(&self) -> i32 {
        self.ymin
    }

    pub fn xmax(&self) -> i32 {
        self.xmax
    }

    pub fn ymax(&self) -> i32 {
        self.ymax
    }

    /// Saturates at `u32::MAX`; the i32 difference can exceed `i32::MAX`.
    pub fn width(&self) -> u32 {
        span(self.xmin, self.xmax)
    }

    pub fn height(&self) -> u32 {
        span(self.ymin, self.ymax)
    }

    pub fn area(&self) -> i64 {
        area(self)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        iou(self, other)
    }

    /// Clamps the box to an image of the given size.
    ///
    /// Returns `(x, y, width, height)` of the visible region, or `None` when the
    /// box lies entirely outside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let (width, height) = (width as i64, height as i64);
        let x0 = (self.xmin as i64).clamp(0, width);
        let y0 = (self.ymin as i64).clamp(0, height);
        let x1 = (self.xmax as i64).clamp(0, width);
        let y1 = (self.ymax as i64).clamp(0, height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

fn span(min: i32, max: i32) -> u32 {
    u32::try_from(max as i64 - min as i64).unwrap_or(u32::MAX)
}

/// `(xmax - xmin) * (ymax - ymin)`, widened to avoid overflow on large frames.
pub fn area(b: &BoundingBox) -> i64 {
    (b.xmax as i64 - b.xmin as i64) * (b.ymax as i64 - b.ymin as i64)
}

fn intersection(a: &BoundingBox, b: &BoundingBox) -> i64 {
    let w = (a.xmax.min(b.xmax) as i64 - a.xmin.max(b.xmin) as i64).max(0);
    let h = (a.ymax.min(b.ymax) as i64 - a.ymin.max(b.ymin) as i64).max(0);
    w * h
}

/// Intersection over union. Disjoint boxes yield 0; an empty union yields 0.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter = intersection(a, b);
    let union = area(a) + area(b) - inter;
    if union <= 0 {
        return 0.0;
    }
    inter as f32 / union as f32
}
