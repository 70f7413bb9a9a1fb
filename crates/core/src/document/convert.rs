//! Office-to-PDF conversion through a headless LibreOffice process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::config::ConversionConfig;

const CANDIDATE_BINARIES: [&str; 2] = ["soffice", "libreoffice"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("no office converter binary was found on PATH")]
    NotFound,
    #[error("failed to launch converter: {0}")]
    Spawn(String),
    #[error("converter exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
    #[error("conversion timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("converter produced no output for `{0}`")]
    MissingOutput(PathBuf),
    #[error("conversion gate is closed")]
    Closed,
}

/// Converts an office or HTML document to PDF, writing the result next to
/// the input with a `.pdf` extension.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError>;
}

pub fn pdf_sibling(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

#[derive(Clone, Debug)]
pub struct SofficeConverter {
    binary: PathBuf,
}

impl SofficeConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Uses the configured binary when set, otherwise the first of
    /// `soffice`/`libreoffice` found on PATH.
    pub fn discover(configured: Option<&Path>) -> Result<Self, ConversionError> {
        if let Some(binary) = configured {
            return Ok(Self::new(binary));
        }
        CANDIDATE_BINARIES
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .map(Self::new)
            .ok_or(ConversionError::NotFound)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        let out_dir = input.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        // Concurrent soffice processes must not share a user profile.
        let profile =
            tempfile::TempDir::new().map_err(|error| ConversionError::Spawn(error.to_string()))?;
        let profile_arg = format!("-env:UserInstallation=file://{}", profile.path().display());

        debug!(
            event_name = "conversion.started",
            input = %input.display(),
            binary = %self.binary.display(),
            "converting document to pdf"
        );

        let output = Command::new(&self.binary)
            .arg(profile_arg)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&out_dir)
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| ConversionError::Spawn(error.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            error!(event_name = "conversion.failed", input = %input.display(), stderr = %stderr, "converter failed");
            return Err(ConversionError::Failed { status: output.status.code().unwrap_or(-1), stderr });
        }

        let converted = out_dir.join(pdf_sibling(input).file_name().unwrap_or_default());
        if !tokio::fs::try_exists(&converted).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput(input.to_path_buf()));
        }
        Ok(converted)
    }
}

/// Bounds concurrent conversions process-wide. The timeout covers the
/// conversion itself, not the wait for a permit.
#[derive(Clone)]
pub struct ConversionGate {
    converter: Arc<dyn DocumentConverter>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ConversionGate {
    pub fn new(converter: Arc<dyn DocumentConverter>, max_concurrent: usize, timeout: Duration) -> Self {
        Self { converter, permits: Arc::new(Semaphore::new(max_concurrent.max(1))), timeout }
    }

    pub fn from_config(converter: Arc<dyn DocumentConverter>, config: &ConversionConfig) -> Self {
        Self::new(converter, config.max_concurrent, Duration::from_secs(config.timeout_secs))
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        let _permit = self.permits.acquire().await.map_err(|_| ConversionError::Closed)?;
        match tokio::time::timeout(self.timeout, self.converter.convert(input)).await {
            Ok(result) => result,
            Err(_) => Err(ConversionError::Timeout { secs: self.timeout.as_secs() }),
        }
    }
}

impl std::fmt::Debug for ConversionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionGate")
            .field("available_permits", &self.permits.available_permits())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::document::convert::{
        pdf_sibling, ConversionError, ConversionGate, DocumentConverter, SofficeConverter,
    };

    struct SlowConverter {
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl DocumentConverter for SlowConverter {
        async fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(pdf_sibling(input))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gate_limits_concurrent_conversions() {
        let converter = Arc::new(SlowConverter {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let gate = ConversionGate::new(converter.clone(), 2, Duration::from_secs(5));

        let inputs: Vec<PathBuf> = (0..6).map(|index| PathBuf::from(format!("/tmp/deck_{index}.pptx"))).collect();
        let results = futures::future::join_all(inputs.iter().map(|input| gate.convert(input))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(converter.peak.load(Ordering::SeqCst), 2);
        assert_eq!(gate.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_conversion_times_out() {
        let converter = Arc::new(SlowConverter {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_secs(30),
        });
        let gate = ConversionGate::new(converter, 1, Duration::from_secs(2));

        let error = gate.convert(Path::new("/tmp/slow.pptx")).await.expect_err("timeout");
        assert_eq!(error, ConversionError::Timeout { secs: 2 });
    }

    #[test]
    fn configured_binary_skips_discovery() {
        let converter =
            SofficeConverter::discover(Some(Path::new("/opt/office/soffice"))).expect("configured");
        assert_eq!(converter.binary(), Path::new("/opt/office/soffice"));
        assert_eq!(pdf_sibling(Path::new("/work/a.pptx")), PathBuf::from("/work/a.pdf"));
    }
}
