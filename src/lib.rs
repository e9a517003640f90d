//! Classroom Lens
//!
//! Analyzes classroom photographs: finds the people in an image, classifies
//! each person's facial expression, maps the expression onto a classroom
//! engagement label, and produces per-image counts, a text summary and an
//! annotated copy of the image.
//!
//! # Module Structure
//!
//! - `geometry`, `suppress`: boxes, IoU, greedy non-maximum suppression
//! - `detect`: person detector backends
//! - `expression`: per-face emotion backends and the classifier adapter
//! - `labels`: emotion to classroom label mapping
//! - `aggregate`, `annotate`: counts, summary lines, output image
//! - `pipeline`: the per-image state machine
//! - `storage`, `blob`, `service`: persistence of finished analyses
//! - `config`: file and environment configuration

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod aggregate;
pub mod annotate;
pub mod blob;
pub mod config;
pub mod detect;
pub mod error;
pub mod expression;
pub mod geometry;
pub mod labels;
pub mod pipeline;
pub mod service;
pub mod storage;
pub mod suppress;

pub use aggregate::{Aggregator, LabelCounts};
pub use annotate::{AnnotationStyle, Annotator, LabelledBox};
pub use blob::FilesystemBlobStore;
pub use config::ServiceConfig;
pub use detect::{BackendRegistry, Detection, DetectorBackend, ObjectClass, StubBackend};
pub use error::{AnalysisError, ClassificationError};
pub use expression::{
    EmotionAnalysis, EmotionScores, ExpressionBackend, ExpressionClassifier, StubExpressionBackend,
};
pub use geometry::{area, iou, BoundingBox};
pub use labels::{remap, CanonicalEmotion, ClassroomLabel, Emotion};
pub use pipeline::{AnalysisResult, Pipeline, PipelineSettings, PipelineStage};
pub use service::AnalysisService;
pub use storage::{
    AnalysisRecord, AnalysisStore, HistoryPage, InMemoryAnalysisStore, NewAnalysis,
    SqliteAnalysisStore,
};
pub use suppress::greedy_nms;

/// URI for a private, shared-cache in-memory SQLite database.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:classroom_lens_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
