//! Filesystem storage for uploaded and annotated images.
//!
//! Files are write-once: a name that already exists is never overwritten.

use anyhow::{anyhow, Context, Result};
use rand::RngCore;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const PROCESSED_PREFIX: &str = "processed_";
const FALLBACK_NAME: &str = "upload";

#[derive(Clone, Debug)]
pub struct FilesystemBlobStore {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
}

impl FilesystemBlobStore {
    /// Creates both directories if missing.
    pub fn new(upload_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Result<Self> {
        let upload_dir = upload_dir.into();
        let processed_dir = processed_dir.into();
        fs::create_dir_all(&upload_dir)
            .with_context(|| format!("create upload dir {}", upload_dir.display()))?;
        fs::create_dir_all(&processed_dir)
            .with_context(|| format!("create processed dir {}", processed_dir.display()))?;
        Ok(Self {
            upload_dir,
            processed_dir,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// `{32 hex}_{sanitized}` for a client-supplied filename.
    pub fn unique_upload_name(original_filename: &str) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{}_{}", hex::encode(bytes), sanitize_filename(original_filename))
    }

    pub fn processed_name(upload_name: &str) -> String {
        format!("{}{}", PROCESSED_PREFIX, upload_name)
    }

    pub fn write_upload(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        write_new(&self.upload_dir, name, bytes)
    }

    pub fn write_processed(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        write_new(&self.processed_dir, name, bytes)
    }

    pub fn read_upload(&self, name: &str) -> Result<Vec<u8>> {
        read_file(&self.upload_dir.join(checked_name(name)?))
    }

    pub fn read_processed(&self, name: &str) -> Result<Vec<u8>> {
        read_file(&self.processed_dir.join(checked_name(name)?))
    }

    pub fn processed_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.processed_dir.join(checked_name(name)?))
    }

    /// Best-effort removal, used to undo a partially stored submission.
    pub fn remove(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path) {
            log::warn!("failed to remove {}: {}", path.display(), err);
        }
    }
}

/// Keeps `[A-Za-z0-9._-]` from the last path component, replacing anything
/// else with `_`.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn checked_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(anyhow!("blob name cannot be empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(anyhow!("blob name must be a plain file name: {}", name));
    }
    Ok(name)
}

fn write_new(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(checked_name(name)?);
    if path.exists() {
        return Err(anyhow!("blob already exists: {}", path.display()));
    }
    write_atomic(&path, data)?;
    Ok(path)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
