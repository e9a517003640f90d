use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{ImageFormat, Rgb, RgbImage};

use classroom_lens::detect::SharedDetector;
use classroom_lens::{
    AnalysisError, AnnotationStyle, BoundingBox, ClassroomLabel, Detection, EmotionAnalysis,
    EmotionScores, ExpressionBackend, ExpressionClassifier, ObjectClass, Pipeline,
    PipelineSettings, StubBackend, StubExpressionBackend,
};

const BACKGROUND: Rgb<u8> = Rgb([90, 110, 130]);

fn bx(x0: i32, y0: i32, x1: i32, y1: i32) -> BoundingBox {
    BoundingBox::new(x0, y0, x1, y1).expect("valid box")
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, BACKGROUND);
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

fn scores(pairs: &[(&str, f32)]) -> EmotionScores {
    pairs.iter().map(|(name, score)| (*name, *score)).collect()
}

struct Harness {
    pipeline: Pipeline,
    classifier_calls: Arc<AtomicUsize>,
}

fn harness(detections: Vec<Detection>, expr: StubExpressionBackend) -> Harness {
    let classifier_calls = expr.call_counter();
    let detector: SharedDetector = Arc::new(Mutex::new(StubBackend::with_detections(detections)));
    Harness {
        pipeline: Pipeline::new(
            detector,
            ExpressionClassifier::new(expr),
            PipelineSettings::default(),
        ),
        classifier_calls,
    }
}

#[test]
fn overlapping_people_collapse_to_one() {
    // IoU 0.6 against the default 0.4 threshold.
    let h = harness(
        vec![
            Detection::person(bx(0, 0, 100, 100), 0.9),
            Detection::person(bx(0, 0, 100, 60), 0.5),
        ],
        StubExpressionBackend::fixed(scores(&[("happy", 0.8), ("neutral", 0.2)])),
    );

    let result = h.pipeline.analyze(&png_bytes(200, 200)).expect("analysis");

    assert_eq!(result.person_count(), 1);
    assert_eq!(h.classifier_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.outcomes().len(), 1);
    assert_eq!(result.outcomes()[0].detection.confidence, 0.9);
    assert_eq!(result.label_counts().active_engagement, 1);
    assert_eq!(
        result.summary_text(),
        "Total People Detected: 1\nActive Engagement: 1"
    );
}

#[test]
fn overlap_equal_to_threshold_is_kept() {
    // IoU exactly 0.4.
    let h = harness(
        vec![
            Detection::person(bx(0, 0, 100, 100), 0.9),
            Detection::person(bx(0, 0, 100, 40), 0.5),
        ],
        StubExpressionBackend::new(),
    );

    let result = h.pipeline.analyze(&png_bytes(200, 200)).expect("analysis");

    assert_eq!(result.person_count(), 2);
    assert_eq!(h.classifier_calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.label_counts().calm_attention, 2);
}

#[test]
fn empty_scene_reports_zero_people() {
    let h = harness(Vec::new(), StubExpressionBackend::new());

    let result = h.pipeline.analyze(&png_bytes(400, 120)).expect("analysis");

    assert_eq!(result.person_count(), 0);
    assert_eq!(result.summary_text(), "Total People Detected: 0");
    assert_eq!(result.label_counts().total(), 0);
    assert_eq!(h.classifier_calls.load(Ordering::SeqCst), 0);

    // Only the summary header is drawn: red glyphs in the 14 rows above the
    // first baseline, starting at the summary origin.
    let style = AnnotationStyle::default();
    let (origin_x, baseline) = style.summary_origin;
    let annotated = result.annotated_image();
    assert_eq!(annotated.dimensions(), (400, 120));
    let mut changed = 0;
    for (x, y, pixel) in annotated.enumerate_pixels() {
        if *pixel == BACKGROUND {
            continue;
        }
        changed += 1;
        assert_eq!(*pixel, style.summary_color, "unexpected colour at ({}, {})", x, y);
        assert!(x as i32 >= origin_x, "pixel left of the summary at ({}, {})", x, y);
        assert!(
            (baseline - 14..baseline).contains(&(y as i32)),
            "pixel outside the header row at ({}, {})",
            x,
            y
        );
    }
    assert!(changed > 0);
}

#[test]
fn failed_classification_still_counts_the_person() {
    let h = harness(
        vec![Detection::person(bx(10, 10, 60, 80), 0.8)],
        StubExpressionBackend::failing(),
    );

    let result = h.pipeline.analyze(&png_bytes(100, 100)).expect("analysis");

    assert_eq!(result.person_count(), 1);
    assert_eq!(result.label_counts().total(), 0);
    assert_eq!(result.summary_text(), "Total People Detected: 1");
    assert!(result.outcomes()[0].label().is_none());

    // No outline and no label for the unclassified box.
    let style = AnnotationStyle::default();
    let annotated = result.annotated_image();
    assert!(annotated
        .pixels()
        .all(|p| *p != style.box_color && *p != style.label_color));
    for x in 10..60 {
        assert_eq!(*annotated.get_pixel(x, 10), BACKGROUND, "top edge at x={}", x);
        assert_eq!(*annotated.get_pixel(x, 79), BACKGROUND, "bottom edge at x={}", x);
    }
    for y in 10..80 {
        assert_eq!(*annotated.get_pixel(10, y), BACKGROUND, "left edge at y={}", y);
    }
}

/// Panics on its first crop, then answers "happy".
struct CrashOnceBackend {
    crashed: bool,
}

impl ExpressionBackend for CrashOnceBackend {
    fn name(&self) -> &'static str {
        "crash-once"
    }

    fn analyze(&mut self, _face: &RgbImage) -> anyhow::Result<EmotionAnalysis> {
        if !self.crashed {
            self.crashed = true;
            panic!("model crashed");
        }
        Ok(EmotionAnalysis::Single(scores(&[("happy", 0.9), ("sad", 0.1)])))
    }
}

#[test]
fn classifier_panic_skips_one_person_and_later_runs_recover() {
    let detector: SharedDetector = Arc::new(Mutex::new(StubBackend::with_detections(vec![
        Detection::person(bx(0, 0, 40, 40), 0.9),
        Detection::person(bx(60, 0, 100, 40), 0.8),
    ])));
    let pipeline = Pipeline::new(
        detector,
        ExpressionClassifier::new(CrashOnceBackend { crashed: false }),
        PipelineSettings::default(),
    );
    let bytes = png_bytes(120, 60);

    let first = pipeline.analyze(&bytes).expect("panic is contained to one crop");
    assert_eq!(first.person_count(), 2);
    assert!(first.outcomes()[0].label().is_none());
    assert_eq!(
        first.outcomes()[1].label(),
        Some(&ClassroomLabel::ActiveEngagement)
    );
    assert_eq!(first.label_counts().active_engagement, 1);

    let second = pipeline.analyze(&bytes).expect("second run");
    assert_eq!(second.person_count(), 2);
    assert_eq!(second.label_counts().active_engagement, 2);
}

#[test]
fn summary_lists_labels_in_first_seen_order() {
    let script = vec![
        Ok(EmotionAnalysis::Single(scores(&[("sad", 0.7), ("happy", 0.3)]))),
        Err(anyhow::anyhow!("face not detected")),
        Ok(EmotionAnalysis::Multiple(vec![
            scores(&[("happy", 0.6), ("fear", 0.4)]),
            scores(&[("angry", 0.9)]),
        ])),
        Ok(EmotionAnalysis::Single(scores(&[("sad", 0.55), ("neutral", 0.45)]))),
    ];
    // Disjoint boxes, processed by descending confidence.
    let h = harness(
        vec![
            Detection::person(bx(0, 0, 40, 40), 0.95),
            Detection::person(bx(50, 0, 90, 40), 0.85),
            Detection::person(bx(100, 0, 140, 40), 0.75),
            Detection::person(bx(150, 0, 190, 40), 0.65),
        ],
        StubExpressionBackend::scripted(script),
    );

    let result = h.pipeline.analyze(&png_bytes(200, 100)).expect("analysis");

    assert_eq!(result.person_count(), 4);
    assert_eq!(
        result.summary_lines(),
        &[
            "Total People Detected: 4".to_string(),
            "Focused Challenge: 2".to_string(),
            "Active Engagement: 1".to_string(),
        ]
    );
    let counts = result.label_counts();
    assert_eq!(counts.focused_challenge, 2);
    assert_eq!(counts.active_engagement, 1);
    assert_eq!(counts.classroom_tension, 0);
}

#[test]
fn unknown_emotion_passes_through() {
    let h = harness(
        vec![Detection::person(bx(10, 10, 60, 60), 0.8)],
        StubExpressionBackend::fixed(scores(&[("disgust", 0.9), ("happy", 0.1)])),
    );

    let result = h.pipeline.analyze(&png_bytes(100, 100)).expect("analysis");

    assert_eq!(
        result.outcomes()[0].label(),
        Some(&ClassroomLabel::Unmapped("Disgust".to_string()))
    );
    assert_eq!(result.summary_text(), "Total People Detected: 1\nDisgust: 1");
    assert_eq!(result.label_counts().total(), 0);
}

#[test]
fn non_person_classes_never_reach_the_classifier() {
    let h = harness(
        vec![
            Detection::new(bx(0, 0, 50, 50), 0.9, ObjectClass::Vehicle),
            Detection::person(bx(60, 60, 90, 90), 0.6),
        ],
        StubExpressionBackend::new(),
    );

    let result = h.pipeline.analyze(&png_bytes(100, 100)).expect("analysis");

    assert_eq!(result.person_count(), 1);
    assert_eq!(h.classifier_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn undecodable_upload_fails_the_run() {
    let h = harness(
        vec![Detection::person(bx(0, 0, 10, 10), 0.9)],
        StubExpressionBackend::new(),
    );

    let err = h
        .pipeline
        .analyze(b"definitely not an image")
        .expect_err("decode must fail");

    assert!(matches!(err, AnalysisError::ImageDecode(_)));
    assert_eq!(h.classifier_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn annotated_copy_differs_and_source_format_is_kept() {
    let bytes = png_bytes(120, 120);
    let h = harness(
        vec![Detection::person(bx(20, 40, 100, 110), 0.88)],
        StubExpressionBackend::new(),
    );

    let result = h.pipeline.analyze(&bytes).expect("analysis");
    let encoded = result.encode_annotated().expect("encode");

    assert_eq!(result.format(), ImageFormat::Png);
    assert_eq!(image::guess_format(&encoded).expect("format"), ImageFormat::Png);
    let decoded = image::load_from_memory(&encoded).expect("decode").to_rgb8();
    let original = image::load_from_memory(&bytes).expect("decode").to_rgb8();
    assert_eq!(decoded.dimensions(), original.dimensions());
    assert_ne!(decoded, original);
}
