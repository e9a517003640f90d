//! Annotated output image: detection boxes, per-detection labels, summary block.

pub mod font;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::geometry::BoundingBox;

/// Drawing parameters. Defaults: green boxes and labels, red summary block at
/// the top-left, one summary line every 50 pixels.
#[derive(Clone, Debug)]
pub struct AnnotationStyle {
    pub box_color: Rgb<u8>,
    pub box_thickness: u32,
    pub label_color: Rgb<u8>,
    pub label_scale: u32,
    /// Gap between the label baseline and the top edge of its box.
    pub label_gap: i32,
    pub summary_color: Rgb<u8>,
    pub summary_scale: u32,
    pub summary_origin: (i32, i32),
    pub summary_line_step: i32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: Rgb([0, 255, 0]),
            box_thickness: 2,
            label_color: Rgb([0, 255, 0]),
            label_scale: 1,
            label_gap: 10,
            summary_color: Rgb([255, 0, 0]),
            summary_scale: 2,
            summary_origin: (30, 30),
            summary_line_step: 50,
        }
    }
}

/// One classified detection to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelledBox {
    pub bbox: BoundingBox,
    pub text: String,
}

#[derive(Clone, Debug, Default)]
pub struct Annotator {
    style: AnnotationStyle,
}

impl Annotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Renders onto a copy of `source`; the source is left untouched.
    pub fn annotate(&self, source: &RgbImage, boxes: &[LabelledBox], summary_lines: &[String]) -> RgbImage {
        let mut canvas = source.clone();
        for labelled in boxes {
            self.draw_box(&mut canvas, &labelled.bbox);
            self.draw_label(&mut canvas, &labelled.bbox, &labelled.text);
        }
        self.draw_summary(&mut canvas, summary_lines);
        canvas
    }

    /// Edges that fall outside the canvas stay outside it; only the visible
    /// part of the box is handed to the rectangle drawer.
    pub fn draw_box(&self, canvas: &mut RgbImage, bbox: &BoundingBox) {
        let margin = self.style.box_thickness as i64 + 1;
        let x0 = (bbox.xmin() as i64).max(-margin);
        let y0 = (bbox.ymin() as i64).max(-margin);
        let x1 = (bbox.xmax() as i64).min(canvas.width() as i64 + margin);
        let y1 = (bbox.ymax() as i64).min(canvas.height() as i64 + margin);
        for inset in 0..self.style.box_thickness as i64 {
            let w = x1 - x0 - 2 * inset;
            let h = y1 - y0 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at((x0 + inset) as i32, (y0 + inset) as i32).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, self.style.box_color);
        }
    }

    /// Baseline for a box label: above the box, or just inside its top edge
    /// when there is no room above.
    pub fn label_baseline(&self, bbox: &BoundingBox) -> i32 {
        let text_h = font::text_height(self.style.label_scale) as i32;
        let above = bbox.ymin().saturating_sub(self.style.label_gap);
        if above.saturating_sub(text_h) >= 0 {
            above
        } else {
            bbox.ymin()
                .saturating_add(self.style.box_thickness as i32)
                .saturating_add(text_h)
        }
    }

    pub fn draw_label(&self, canvas: &mut RgbImage, bbox: &BoundingBox, text: &str) {
        let baseline = self.label_baseline(bbox);
        font::draw_text(
            canvas,
            bbox.xmin(),
            baseline,
            text,
            self.style.label_scale,
            self.style.label_color,
        );
    }

    pub fn draw_summary(&self, canvas: &mut RgbImage, lines: &[String]) {
        let (x, mut y) = self.style.summary_origin;
        for line in lines {
            font::draw_text(
                canvas,
                x,
                y,
                line,
                self.style.summary_scale,
                self.style.summary_color,
            );
            y += self.style.summary_line_step;
        }
    }
}
