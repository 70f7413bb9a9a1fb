use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::location::LocationMetadata;
use crate::domain::package::{PackageDescriptor, PackageItem};
use crate::store::{
    download_name, in_scope, package_matches, PackageRecord, StoreError, TemplateFormat,
    TemplateStore,
};

/// Byte-backed store for tests and dry runs. Every download is recorded,
/// and per-key delays let callers force out-of-order completion.
#[derive(Clone, Default)]
pub struct InMemoryTemplateStore {
    locations: Vec<LocationMetadata>,
    packages: Vec<PackageRecord>,
    templates: HashMap<(String, TemplateFormat), Vec<u8>>,
    assets: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    downloads: Arc<Mutex<Vec<String>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: LocationMetadata) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_package(mut self, package: PackageRecord) -> Self {
        self.packages.push(package);
        self
    }

    pub fn with_template(mut self, key: &str, format: TemplateFormat, bytes: Vec<u8>) -> Self {
        self.templates.insert((key.to_string(), format), bytes);
        self
    }

    pub fn with_intro_outro_asset(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.assets.insert(name.to_string(), bytes);
        self
    }

    /// Delays every download of `key` (templates and assets).
    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    /// Download log entries look like `pdf:the_gateway` or `asset:landmark_series`.
    pub fn downloads(&self) -> Vec<String> {
        match self.downloads.lock() {
            Ok(downloads) => downloads.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn download_count(&self, entry: &str) -> usize {
        self.downloads().iter().filter(|logged| logged.as_str() == entry).count()
    }

    fn record(&self, entry: String) {
        match self.downloads.lock() {
            Ok(mut downloads) => downloads.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    async fn pause_for(&self, key: &str) {
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
    }

    async fn write_copy(
        bytes: &[u8],
        dest_dir: &Path,
        key: &str,
        extension: &str,
    ) -> Result<PathBuf, StoreError> {
        let target = dest_dir.join(download_name(key, extension));
        tokio::fs::write(&target, bytes).await.map_err(|error| StoreError::io(&target, error))?;
        Ok(target)
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn fetch_location_catalog(
        &self,
        company_scopes: &[String],
    ) -> Result<Vec<LocationMetadata>, StoreError> {
        Ok(self
            .locations
            .iter()
            .filter(|location| in_scope(&location.company, company_scopes))
            .cloned()
            .collect())
    }

    async fn fetch_package(
        &self,
        key: &str,
        company_scopes: &[String],
    ) -> Result<Option<PackageDescriptor>, StoreError> {
        Ok(self
            .packages
            .iter()
            .filter(|package| in_scope(&package.company, company_scopes))
            .find(|package| package_matches(&package.key, &package.display_name, key))
            .map(PackageRecord::descriptor))
    }

    async fn fetch_package_items(&self, package_id: &str) -> Result<Vec<PackageItem>, StoreError> {
        Ok(self
            .packages
            .iter()
            .find(|package| package.id == package_id)
            .map(PackageRecord::items)
            .unwrap_or_default())
    }

    async fn download_template(
        &self,
        key: &str,
        _company_hint: Option<&str>,
        format: TemplateFormat,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StoreError> {
        self.pause_for(key).await;
        let Some(bytes) = self.templates.get(&(key.to_string(), format)) else {
            return Ok(None);
        };
        self.record(format!("{}:{key}", format.extension()));
        Self::write_copy(bytes, dest_dir, key, format.extension()).await.map(Some)
    }

    async fn download_intro_outro_asset(
        &self,
        name: &str,
        _company_hint: Option<&str>,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StoreError> {
        self.pause_for(name).await;
        let Some(bytes) = self.assets.get(name) else {
            return Ok(None);
        };
        self.record(format!("asset:{name}"));
        Self::write_copy(bytes, dest_dir, name, "pdf").await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::store::{InMemoryTemplateStore, TemplateFormat, TemplateStore};

    #[tokio::test]
    async fn downloads_are_logged_and_copied() {
        let store = InMemoryTemplateStore::new().with_template(
            "the_gateway",
            TemplateFormat::Pdf,
            b"%PDF-1.5".to_vec(),
        );
        let workspace = TempDir::new().expect("workspace");

        let first = store
            .download_template("the_gateway", None, TemplateFormat::Pdf, workspace.path())
            .await
            .expect("download");
        let second = store
            .download_template("the_gateway", None, TemplateFormat::Pdf, workspace.path())
            .await
            .expect("download");
        let deck = store
            .download_template("the_gateway", None, TemplateFormat::Deck, workspace.path())
            .await
            .expect("download");

        assert!(first.is_some() && second.is_some());
        assert_ne!(first, second);
        assert!(deck.is_none());
        assert_eq!(store.download_count("pdf:the_gateway"), 2);
    }
}
