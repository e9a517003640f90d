use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use classroom_lens::config::{HistorySettings, ServiceConfig};
use classroom_lens::detect::SharedDetector;
use classroom_lens::{
    AnalysisError, AnalysisService, BoundingBox, Detection, EmotionScores, ExpressionClassifier,
    FilesystemBlobStore, InMemoryAnalysisStore, Pipeline, PipelineSettings, StubBackend,
    StubExpressionBackend,
};

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([180, 170, 160]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Jpeg).expect("encode jpeg");
    out.into_inner()
}

fn service(dir: &TempDir, detections: Vec<Detection>) -> AnalysisService {
    let detector: SharedDetector = Arc::new(Mutex::new(StubBackend::with_detections(detections)));
    let happy: EmotionScores = [("happy", 0.7), ("neutral", 0.3)].into_iter().collect();
    let pipeline = Pipeline::new(
        detector,
        ExpressionClassifier::new(StubExpressionBackend::fixed(happy)),
        PipelineSettings::default(),
    );
    let blobs = FilesystemBlobStore::new(dir.path().join("uploads"), dir.path().join("processed"))
        .expect("blob store");
    AnalysisService::new(
        pipeline,
        blobs,
        Box::new(InMemoryAnalysisStore::new()),
        HistorySettings {
            default_limit: 2,
            max_limit: 3,
        },
    )
}

fn file_count(path: &std::path::Path) -> usize {
    std::fs::read_dir(path).expect("read dir").count()
}

#[test]
fn submit_stores_images_and_record() {
    let dir = TempDir::new().expect("tempdir");
    let people = vec![
        Detection::person(BoundingBox::new(10, 10, 60, 90).unwrap(), 0.9),
        Detection::person(BoundingBox::new(80, 10, 130, 90).unwrap(), 0.7),
    ];
    let mut service = service(&dir, people);
    let bytes = jpeg_bytes(160, 120);

    let record = service.submit("period 3/room 12.jpg", &bytes).expect("submit");

    assert_eq!(record.person_count, 2);
    assert_eq!(record.label_counts.active_engagement, 2);
    assert_eq!(record.summary, "Total People Detected: 2\nActive Engagement: 2");
    assert!(record.image_filename.ends_with("_room_12.jpg"));
    assert_eq!(
        record.processed_image_filename,
        format!("processed_{}", record.image_filename)
    );

    let blobs = service.blobs();
    assert_eq!(blobs.read_upload(&record.image_filename).unwrap(), bytes);
    let processed = blobs
        .read_processed(&record.processed_image_filename)
        .unwrap();
    assert_eq!(image::guess_format(&processed).unwrap(), ImageFormat::Jpeg);

    let fetched = service.result(record.id).expect("lookup").expect("record");
    assert_eq!(fetched, record);
    assert!(service.result(record.id + 100).unwrap().is_none());
}

#[test]
fn failed_analysis_leaves_nothing_behind() {
    let dir = TempDir::new().expect("tempdir");
    let mut service = service(&dir, Vec::new());

    let mut truncated = b"\x89PNG\r\n\x1a\n".to_vec();
    truncated.extend_from_slice(b"IHDR");

    let err = service
        .submit("broken.png", &truncated)
        .expect_err("decode failure");

    assert!(matches!(
        err.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::ImageDecode(_))
    ));
    assert_eq!(file_count(&dir.path().join("uploads")), 0);
    assert_eq!(file_count(&dir.path().join("processed")), 0);
    assert_eq!(service.history(None, None).unwrap().total, 0);
}

#[test]
fn history_pages_newest_first_with_limits() {
    let dir = TempDir::new().expect("tempdir");
    let mut service = service(&dir, Vec::new());
    let bytes = jpeg_bytes(32, 32);
    let ids: Vec<i64> = (0..5)
        .map(|i| service.submit(&format!("shot{}.jpg", i), &bytes).unwrap().id)
        .collect();

    let first = service.history(None, None).unwrap();
    assert_eq!(first.page, 1);
    assert_eq!(first.limit, 2);
    assert_eq!(first.total, 5);
    assert_eq!(first.total_pages, 3);
    assert_eq!(
        first.records.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![ids[4], ids[3]]
    );

    let capped = service.history(Some(1), Some(50)).unwrap();
    assert_eq!(capped.limit, 3);
    assert_eq!(capped.records.len(), 3);

    assert!(service.history(Some(0), None).is_err());
}

#[test]
fn from_config_builds_stub_service() {
    let dir = TempDir::new().expect("tempdir");
    let mut cfg = ServiceConfig::default();
    cfg.db_path = dir.path().join("lens.db").display().to_string();
    cfg.upload_dir = dir.path().join("up");
    cfg.processed_dir = dir.path().join("out");
    cfg.validate().expect("valid config");

    let mut service = AnalysisService::from_config(&cfg).expect("service");
    let record = service.submit("empty.jpg", &jpeg_bytes(64, 64)).expect("submit");

    assert_eq!(record.person_count, 0);
    assert_eq!(record.summary, "Total People Detected: 0");
    assert!(dir.path().join("up").join(&record.image_filename).exists());
    assert!(service.processed_image_path(&record).unwrap().exists());
}

#[test]
fn from_config_rejects_unknown_backend() {
    let dir = TempDir::new().expect("tempdir");
    let mut cfg = ServiceConfig::default();
    cfg.db_path = dir.path().join("lens.db").display().to_string();
    cfg.upload_dir = dir.path().join("up");
    cfg.processed_dir = dir.path().join("out");
    cfg.classifier.backend = "cloud".to_string();

    assert!(AnalysisService::from_config(&cfg).is_err());
}
