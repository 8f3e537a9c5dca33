use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

use crate::api::middleware::AppError;

/// Local directory holding uploaded inputs and export artifacts.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Resolve a bare file name inside the store.
    ///
    /// Names with separators or parent components are rejected so requests
    /// cannot reach outside the directory.
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf, AppError> {
        let filename = filename.trim();
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename == "."
            || filename == ".."
        {
            return Err(AppError::Validation(format!("Invalid file name: '{}'", filename)));
        }

        let path = self.root.join(filename);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(AppError::NotFound(format!("Uploaded file not found: {}", filename))),
        }
    }

    /// Start writing an artifact named `filename`; nothing is visible under
    /// that name until [`ArtifactWriter::commit`].
    pub async fn create_artifact(&self, filename: &str) -> Result<ArtifactWriter, AppError> {
        self.ensure_dir().await?;
        let final_path = self.root.join(filename);
        let temp_path = self
            .root
            .join(format!(".{}.{}.part", filename, Uuid::new_v4().simple()));
        let file = File::create(&temp_path).await?;

        Ok(ArtifactWriter {
            writer: BufWriter::new(file),
            temp_path,
            final_path,
            committed: false,
        })
    }
}

/// Artifact name: `export_<base>_<unix millis>.csv`, with unsafe characters replaced.
pub fn export_filename(base: &str, now: DateTime<Utc>) -> String {
    let base: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("export_{}_{}.csv", base, now.timestamp_millis())
}

/// Stored upload name: `file-<unix millis>-<random>.<ext>`, keeping the
/// original extension when it is plain alphanumeric.
pub fn upload_filename(original: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().as_u128() % 1_000_000_000;
    let extension = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    format!("file-{}-{}{}", now.timestamp_millis(), suffix, extension)
}

/// Temp-file writer that renames into place on commit.
///
/// Dropping an uncommitted writer deletes the temp file, so failed exports
/// never leave a partial artifact behind.
pub struct ArtifactWriter {
    writer: BufWriter<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl ArtifactWriter {
    pub fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flush, fsync and atomically rename to the final name.
    pub async fn commit(mut self) -> Result<PathBuf, AppError> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        fs::rename(&self.temp_path, &self.final_path).await?;
        self.committed = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.temp_path) {
                tracing::warn!("Failed to remove partial artifact {}: {}", self.temp_path.display(), e);
            }
        }
    }
}
