use crate::core::PageHandle;
use crate::errors::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// A captured screenshot waiting to be written.
#[derive(Debug, Clone)]
pub struct DiagnosticArtifact {
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub image: Vec<u8>,
}

impl DiagnosticArtifact {
    pub fn new(label: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            timestamp: Utc::now(),
            image,
        }
    }
}

/// Where a stored artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub ordinal: u32,
    pub label: String,
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
}

/// Writes labeled screenshots into one run-scoped directory.
///
/// The directory is created on the first capture. File names carry a
/// per-run ordinal prefix, so two captures with the same label never
/// overwrite each other, and files are opened with `create_new` so an
/// existing artifact is never replaced.
pub struct DiagnosticRecorder {
    run_dir: PathBuf,
    dir_ready: OnceCell<()>,
    next_ordinal: AtomicU32,
    artifacts: Mutex<Vec<ArtifactRef>>,
}

impl DiagnosticRecorder {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            dir_ready: OnceCell::new(),
            next_ordinal: AtomicU32::new(1),
            artifacts: Mutex::new(Vec::new()),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Screenshot the page and store it under `label`.
    pub async fn capture(&self, page: &dyn PageHandle, label: &str) -> Result<ArtifactRef> {
        let image = page.screenshot().await?;
        self.store(DiagnosticArtifact::new(label, image)).await
    }

    /// Like `capture`, but a failed capture is logged instead of returned.
    pub async fn capture_quietly(&self, page: &dyn PageHandle, label: &str) -> Option<ArtifactRef> {
        match self.capture(page, label).await {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!(label, error = %e, "Diagnostic capture failed");
                None
            }
        }
    }

    pub async fn store(&self, artifact: DiagnosticArtifact) -> Result<ArtifactRef> {
        self.dir_ready
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.run_dir).await.map_err(|e| {
                    PipelineError::Diagnostic(format!(
                        "cannot create {}: {}",
                        self.run_dir.display(),
                        e
                    ))
                })
            })
            .await?;

        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        let file_name = format!("{:02}_{}.png", ordinal, sanitize_label(&artifact.label));
        let path = self.run_dir.join(file_name);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&artifact.image).await?;
        file.flush().await?;

        let stored = ArtifactRef {
            ordinal,
            label: artifact.label,
            path,
            captured_at: artifact.timestamp,
        };
        debug!(label = %stored.label, path = %stored.path.display(), "Diagnostic stored");

        self.lock_artifacts().push(stored.clone());
        Ok(stored)
    }

    pub fn artifacts(&self) -> Vec<ArtifactRef> {
        self.lock_artifacts().clone()
    }

    pub fn last(&self) -> Option<ArtifactRef> {
        self.lock_artifacts().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.lock_artifacts().len()
    }

    fn lock_artifacts(&self) -> std::sync::MutexGuard<'_, Vec<ArtifactRef>> {
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPage;

    #[tokio::test]
    async fn test_directory_created_lazily() {
        let root = tempfile::tempdir().unwrap();
        let run_dir = root.path().join("run-1");
        let recorder = DiagnosticRecorder::new(&run_dir);
        assert!(!run_dir.exists());

        let page = ScriptedPage::new();
        let stored = recorder.capture(&page, "home").await.unwrap();

        assert!(run_dir.is_dir());
        assert_eq!(stored.path, run_dir.join("01_home.png"));
        assert_eq!(
            std::fs::read(&stored.path).unwrap(),
            ScriptedPage::SCREENSHOT_BYTES.to_vec()
        );
    }

    #[tokio::test]
    async fn test_repeated_labels_get_distinct_files() {
        let root = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(root.path());

        let first = recorder
            .store(DiagnosticArtifact::new("Cart Page", vec![1]))
            .await
            .unwrap();
        let second = recorder
            .store(DiagnosticArtifact::new("Cart Page", vec![2]))
            .await
            .unwrap();

        assert_ne!(first.path, second.path);
        assert!(first.path.ends_with("01_cart_page.png"));
        assert!(second.path.ends_with("02_cart_page.png"));
        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.last().unwrap().ordinal, 2);
    }

    #[tokio::test]
    async fn test_quiet_capture_swallows_screenshot_failure() {
        let root = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(root.path().join("run"));
        let page = ScriptedPage::new().with_failing_screenshots();

        assert!(recorder.capture_quietly(&page, "checkout").await.is_none());
        assert_eq!(recorder.count(), 0);
        tokio_test::assert_err!(recorder.capture(&page, "checkout").await);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("error login"), "error_login");
        assert_eq!(sanitize_label("../etc"), "___etc");
        assert_eq!(sanitize_label("  "), "artifact");
    }
}
