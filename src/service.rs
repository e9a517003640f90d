//! Upload-to-record flow: analyze an image, store both images, persist the
//! scalar results.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use crate::blob::FilesystemBlobStore;
use crate::config::{ClassifierSettings, DetectorSettings, HistorySettings, ServiceConfig};
use crate::detect::{BackendRegistry, StubBackend};
use crate::expression::{ExpressionClassifier, StubExpressionBackend};
use crate::pipeline::Pipeline;
use crate::storage::{AnalysisRecord, AnalysisStore, HistoryPage, NewAnalysis, SqliteAnalysisStore};

pub struct AnalysisService {
    pipeline: Pipeline,
    blobs: FilesystemBlobStore,
    store: Box<dyn AnalysisStore + Send>,
    history: HistorySettings,
}

impl AnalysisService {
    pub fn new(
        pipeline: Pipeline,
        blobs: FilesystemBlobStore,
        store: Box<dyn AnalysisStore + Send>,
        history: HistorySettings,
    ) -> Self {
        Self {
            pipeline,
            blobs,
            store,
            history,
        }
    }

    /// Loads the configured models once and opens storage.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let registry = build_detectors(&cfg.detector)?;
        let detector = registry
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        let classifier = build_classifier(&cfg.classifier)?;
        log::info!(
            "detector backend: {} (registered: {}), classifier backend: {}",
            registry.default_name().unwrap_or("none"),
            registry.list().join(", "),
            classifier.backend_name()
        );

        let pipeline = Pipeline::new(detector, classifier, cfg.pipeline_settings());
        let blobs = FilesystemBlobStore::new(&cfg.upload_dir, &cfg.processed_dir)?;
        let store = SqliteAnalysisStore::open(&cfg.db_path)
            .with_context(|| format!("open analysis db {}", cfg.db_path))?;
        Ok(Self::new(pipeline, blobs, Box::new(store), cfg.history))
    }

    pub fn blobs(&self) -> &FilesystemBlobStore {
        &self.blobs
    }

    /// Analyze one upload and persist it.
    ///
    /// Nothing is written unless the analysis finalizes. If a later write
    /// fails, files already written for this submission are removed.
    pub fn submit(&mut self, original_filename: &str, bytes: &[u8]) -> Result<AnalysisRecord> {
        log::info!(
            "analyzing upload {} ({} bytes)",
            original_filename,
            bytes.len()
        );
        let result = self.pipeline.analyze(bytes)?;
        let encoded = result.encode_annotated()?;

        let upload_name = FilesystemBlobStore::unique_upload_name(original_filename);
        let processed_name = FilesystemBlobStore::processed_name(&upload_name);

        let upload_path = self.blobs.write_upload(&upload_name, bytes)?;
        let processed_path = match self.blobs.write_processed(&processed_name, &encoded) {
            Ok(path) => path,
            Err(err) => {
                self.blobs.remove(&upload_path);
                return Err(err);
            }
        };

        let record = self.store.append(NewAnalysis {
            image_filename: upload_name,
            processed_image_filename: processed_name,
            person_count: result.person_count(),
            label_counts: *result.label_counts(),
            summary: result.summary_text(),
        });
        match record {
            Ok(record) => {
                log::info!(
                    "stored analysis {}: {} people, upload {}, annotated {}",
                    record.id,
                    record.person_count,
                    record.image_filename,
                    record.processed_image_filename
                );
                Ok(record)
            }
            Err(err) => {
                self.blobs.remove(&upload_path);
                self.blobs.remove(&processed_path);
                Err(err)
            }
        }
    }

    pub fn result(&mut self, id: i64) -> Result<Option<AnalysisRecord>> {
        self.store.get(id)
    }

    pub fn processed_image_path(&self, record: &AnalysisRecord) -> Result<PathBuf> {
        self.blobs.processed_path(&record.processed_image_filename)
    }

    /// Page defaults to 1 and limit to the configured default; limit is capped
    /// at the configured maximum.
    pub fn history(&mut self, page: Option<u32>, limit: Option<u32>) -> Result<HistoryPage> {
        let page = page.unwrap_or(1);
        let limit = limit
            .unwrap_or(self.history.default_limit)
            .min(self.history.max_limit);
        self.store.list_page(page, limit)
    }
}

fn build_detectors(settings: &DetectorSettings) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());

    match settings.backend.as_str() {
        "stub" => {}
        "tract" => register_tract_detector(&mut registry, settings)?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    }
    registry.set_default(&settings.backend)?;
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_tract_detector(registry: &mut BackendRegistry, settings: &DetectorSettings) -> Result<()> {
    use crate::detect::{DetectorBackend, TractBackend};

    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("detector.model_path is required for the tract backend"))?;
    let mut backend = TractBackend::new(path, settings.input_size)?;
    backend.warm_up()?;
    registry.register(backend);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract_detector(_registry: &mut BackendRegistry, _settings: &DetectorSettings) -> Result<()> {
    Err(anyhow!(
        "detector backend 'tract' requires the backend-tract feature"
    ))
}

fn build_classifier(settings: &ClassifierSettings) -> Result<ExpressionClassifier> {
    match settings.backend.as_str() {
        "stub" => Ok(ExpressionClassifier::new(StubExpressionBackend::new())),
        "tract" => tract_classifier(settings),
        other => Err(anyhow!("unknown classifier backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn tract_classifier(settings: &ClassifierSettings) -> Result<ExpressionClassifier> {
    use crate::expression::TractExpressionBackend;

    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("classifier.model_path is required for the tract backend"))?;
    let backend = TractExpressionBackend::new(path, settings.input_size, settings.labels.clone())?;
    Ok(ExpressionClassifier::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_classifier(_settings: &ClassifierSettings) -> Result<ExpressionClassifier> {
    Err(anyhow!(
        "classifier backend 'tract' requires the backend-tract feature"
    ))
}
