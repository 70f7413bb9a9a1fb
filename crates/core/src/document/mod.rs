pub mod convert;
pub mod deck;
pub mod pdf;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

pub use convert::{ConversionError, ConversionGate, DocumentConverter, SofficeConverter};
pub use deck::Deck;
pub use pdf::{extract_pages, merge_ordered, page_count};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("cannot open document `{path}`: {message}")]
    Unreadable { path: PathBuf, message: String },
    #[error("cannot write document `{path}`: {message}")]
    Write { path: PathBuf, message: String },
    #[error("no pages of `{path}` remain after extraction")]
    Empty { path: PathBuf },
    #[error("there are no documents to merge")]
    NothingToMerge,
    #[error("deck `{path}` is malformed: {message}")]
    MalformedDeck { path: PathBuf, message: String },
    #[error("document task was interrupted: {0}")]
    Task(String),
}

impl DocumentError {
    pub fn unreadable(path: &Path, error: impl ToString) -> Self {
        Self::Unreadable { path: path.to_path_buf(), message: error.to_string() }
    }

    pub fn write(path: &Path, error: impl ToString) -> Self {
        Self::Write { path: path.to_path_buf(), message: error.to_string() }
    }

    pub fn malformed(path: &Path, message: impl Into<String>) -> Self {
        Self::MalformedDeck { path: path.to_path_buf(), message: message.into() }
    }
}

/// Runs lopdf/zip work off the async executor.
pub async fn run_blocking<T, F>(task: F) -> Result<T, DocumentError>
where
    F: FnOnce() -> Result<T, DocumentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|error| DocumentError::Task(error.to_string()))?
}

/// Removes a consumed intermediate. Failures are logged, never raised.
pub async fn discard(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!(
                event_name = "document.cleanup_failed",
                path = %path.display(),
                error = %error,
                "could not remove intermediate document"
            );
        }
    }
}
