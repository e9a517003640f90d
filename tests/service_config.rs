use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use classroom_lens::config::ServiceConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CLASSROOM_LENS_CONFIG",
        "CLASSROOM_LENS_DB_PATH",
        "CLASSROOM_LENS_UPLOAD_DIR",
        "CLASSROOM_LENS_PROCESSED_DIR",
        "CLASSROOM_LENS_DETECTOR_BACKEND",
        "CLASSROOM_LENS_DETECTOR_MODEL",
        "CLASSROOM_LENS_CLASSIFIER_BACKEND",
        "CLASSROOM_LENS_CLASSIFIER_MODEL",
        "CLASSROOM_LENS_IOU_THRESHOLD",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ServiceConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "classroom_emotions.db");
    assert_eq!(cfg.upload_dir, PathBuf::from("static/uploads"));
    assert_eq!(cfg.processed_dir, PathBuf::from("static/processed_images"));
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.classifier.backend, "stub");
    assert_eq!(cfg.iou_threshold, 0.4);
    assert_eq!(cfg.classifier.input_size, 48);
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "lens_prod.db",
        "upload_dir": "/srv/lens/uploads",
        "detector": {
            "backend": "stub",
            "confidence_threshold": 0.25,
            "input_size": 320
        },
        "suppression": { "iou_threshold": 0.5 },
        "classifier": {
            "labels": ["happy", "sad"]
        },
        "history": { "default_limit": 20, "max_limit": 50 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("CLASSROOM_LENS_CONFIG", file.path());
    std::env::set_var("CLASSROOM_LENS_PROCESSED_DIR", "/srv/lens/processed");
    std::env::set_var("CLASSROOM_LENS_IOU_THRESHOLD", "0.45");

    let cfg = ServiceConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "lens_prod.db");
    assert_eq!(cfg.upload_dir, PathBuf::from("/srv/lens/uploads"));
    assert_eq!(cfg.processed_dir, PathBuf::from("/srv/lens/processed"));
    assert_eq!(cfg.detector.confidence_threshold, 0.25);
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.iou_threshold, 0.45);
    assert_eq!(cfg.classifier.labels, vec!["happy", "sad"]);
    assert_eq!(cfg.history.default_limit, 20);
    assert_eq!(cfg.history.max_limit, 50);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
db_path = "lens.db"

[detector]
backend = "Stub"
iou_threshold = 0.3

[classifier]
input_size = 64
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("CLASSROOM_LENS_CONFIG", file.path());

    let cfg = ServiceConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "lens.db");
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.iou_threshold, 0.3);
    assert_eq!(cfg.classifier.input_size, 64);

    clear_env();
}

#[test]
fn rejects_unparseable_iou_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CLASSROOM_LENS_IOU_THRESHOLD", "loose");
    assert!(ServiceConfig::load().is_err());

    std::env::set_var("CLASSROOM_LENS_IOU_THRESHOLD", "1.2");
    assert!(ServiceConfig::load().is_err());

    clear_env();
}

#[test]
fn blank_iou_override_is_ignored() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CLASSROOM_LENS_IOU_THRESHOLD", "");
    assert_eq!(ServiceConfig::load().expect("load config").iou_threshold, 0.4);

    std::env::set_var("CLASSROOM_LENS_IOU_THRESHOLD", "   ");
    assert_eq!(ServiceConfig::load().expect("load config").iou_threshold, 0.4);

    clear_env();
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    std::env::set_var("CLASSROOM_LENS_CONFIG", file.path());

    let err = ServiceConfig::load().expect_err("invalid config");
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
