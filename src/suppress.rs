//! Greedy non-maximum suppression.
//!
//! Class-agnostic: callers restrict the input to a single class first.
//! A candidate is dropped only when its IoU with an already kept box is strictly
//! greater than the threshold; IoU equal to the threshold survives.

use std::cmp::Ordering;

use crate::geometry::{iou, BoundingBox};

/// Default IoU threshold used by the pipeline suppressor.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;

/// Returns indices into `boxes` of the boxes to keep, highest score first.
///
/// `boxes` and `scores` are parallel; extra entries in the longer slice are
/// ignored. Equal scores keep their original relative order, so the earlier
/// detection wins a tie. NaN scores rank below every real score.
pub fn greedy_nms(boxes: &[BoundingBox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    let n = boxes.len().min(scores.len());
    let mut order: Vec<usize> = (0..n).collect();
    // Stable sort keeps index order among equal scores.
    order.sort_by(|&a, &b| {
        rank(scores[b])
            .partial_cmp(&rank(scores[a]))
            .unwrap_or(Ordering::Equal)
    });

    let mut keep = Vec::new();
    while let Some((&best, rest)) = order.split_first() {
        keep.push(best);
        order = rest
            .iter()
            .copied()
            .filter(|&i| iou(&boxes[best], &boxes[i]) <= iou_threshold)
            .collect();
    }
    keep
}

fn rank(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}
