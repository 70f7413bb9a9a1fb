pub mod fs;
pub mod memory;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::location::{LocationKey, LocationMetadata};
use crate::domain::package::{PackageDescriptor, PackageItem};

pub use fs::{CatalogDocument, FsTemplateStore, PackageRecord};
pub use memory::InMemoryTemplateStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateFormat {
    /// Already-final document.
    Pdf,
    /// Editable slide deck.
    Deck,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Deck => "pptx",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage i/o failed for `{path}`: {message}")]
    Io { path: PathBuf, message: String },
    #[error("catalog is unreadable: {0}")]
    Catalog(String),
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io { path: path.into(), message: error.to_string() }
    }
}

/// Catalog, package and template source. Lookups answer `None` when
/// something does not exist; errors are reserved for storage failures.
/// Downloads always write a fresh copy into `dest_dir`.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn fetch_location_catalog(
        &self,
        company_scopes: &[String],
    ) -> Result<Vec<LocationMetadata>, StoreError>;

    async fn fetch_package(
        &self,
        key: &str,
        company_scopes: &[String],
    ) -> Result<Option<PackageDescriptor>, StoreError>;

    async fn fetch_package_items(&self, package_id: &str) -> Result<Vec<PackageItem>, StoreError>;

    async fn download_template(
        &self,
        key: &str,
        company_hint: Option<&str>,
        format: TemplateFormat,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StoreError>;

    async fn download_intro_outro_asset(
        &self,
        name: &str,
        company_hint: Option<&str>,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StoreError>;
}

/// Applies a caller-supplied deadline to a store call.
pub async fn with_timeout<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { operation: operation.to_string(), secs: timeout.as_secs() }),
    }
}

pub(crate) fn in_scope(company: &str, company_scopes: &[String]) -> bool {
    company_scopes.is_empty() || company_scopes.iter().any(|scope| scope.eq_ignore_ascii_case(company))
}

/// Lowercase, with `_`/`-` treated as spaces and whitespace collapsed.
pub fn normalize_name(value: &str) -> String {
    value
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn package_matches(record_key: &LocationKey, display_name: &str, wanted: &str) -> bool {
    let wanted = normalize_name(wanted);
    !wanted.is_empty()
        && (normalize_name(record_key.as_str()) == wanted || normalize_name(display_name) == wanted)
}

pub(crate) fn download_name(key: &str, extension: &str) -> String {
    let safe: String = key
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '_' })
        .collect();
    format!("{}_{safe}.{extension}", uuid::Uuid::new_v4().simple())
}
