use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::location::{LocationKey, LocationMetadata};
use crate::domain::package::{PackageDescriptor, PackageItem};
use crate::store::{
    download_name, in_scope, package_matches, StoreError, TemplateFormat, TemplateStore,
};

const INTRO_OUTRO_DIR: &str = "intro_outro";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: String,
    pub key: LocationKey,
    pub display_name: String,
    pub company: String,
    /// Network keys in presentation order.
    #[serde(default)]
    pub networks: Vec<String>,
}

impl PackageRecord {
    pub fn descriptor(&self) -> PackageDescriptor {
        PackageDescriptor {
            id: self.id.clone(),
            key: self.key.clone(),
            display_name: self.display_name.clone(),
            company: self.company.clone(),
        }
    }

    pub fn items(&self) -> Vec<PackageItem> {
        self.networks
            .iter()
            .map(|network| PackageItem { network_key: LocationKey::new(network.clone()) })
            .collect()
    }
}

/// On-disk catalog: `[[locations]]` and `[[packages]]` tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub locations: Vec<LocationMetadata>,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
}

impl CatalogDocument {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        toml::from_str(raw).map_err(|error| StoreError::Catalog(error.to_string()))
    }
}

/// Templates laid out as `<root>/<company>/<key>/<key>.<ext>`, intro/outro
/// assets as `<root>/intro_outro/<name>.pdf` (or under a company directory).
#[derive(Clone, Debug)]
pub struct FsTemplateStore {
    root: PathBuf,
    catalog_path: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>, catalog_file: impl AsRef<Path>) -> Self {
        let root = root.into();
        let catalog_path = root.join(catalog_file);
        Self { root, catalog_path }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn load_catalog(&self) -> Result<CatalogDocument, StoreError> {
        let raw = tokio::fs::read_to_string(&self.catalog_path)
            .await
            .map_err(|error| StoreError::io(&self.catalog_path, error))?;
        CatalogDocument::parse(&raw)
    }

    async fn company_dirs(&self, company_hint: Option<&str>) -> Result<Vec<PathBuf>, StoreError> {
        if let Some(company) = company_hint {
            return Ok(vec![self.root.join(company)]);
        }

        let mut entries =
            tokio::fs::read_dir(&self.root).await.map_err(|error| StoreError::io(&self.root, error))?;
        let mut dirs = Vec::new();
        while let Some(entry) =
            entries.next_entry().await.map_err(|error| StoreError::io(&self.root, error))?
        {
            let path = entry.path();
            if path.is_dir() && entry.file_name() != INTRO_OUTRO_DIR {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn copy_into(source: &Path, dest_dir: &Path, key: &str, extension: &str) -> Result<PathBuf, StoreError> {
        let target = dest_dir.join(download_name(key, extension));
        tokio::fs::copy(source, &target).await.map_err(|error| StoreError::io(source, error))?;
        debug!(
            event_name = "store.downloaded",
            source = %source.display(),
            target = %target.display(),
            "copied template into workspace"
        );
        Ok(target)
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn fetch_location_catalog(
        &self,
        company_scopes: &[String],
    ) -> Result<Vec<LocationMetadata>, StoreError> {
        let catalog = self.load_catalog().await?;
        Ok(catalog
            .locations
            .into_iter()
            .filter(|location| in_scope(&location.company, company_scopes))
            .collect())
    }

    async fn fetch_package(
        &self,
        key: &str,
        company_scopes: &[String],
    ) -> Result<Option<PackageDescriptor>, StoreError> {
        let catalog = self.load_catalog().await?;
        Ok(catalog
            .packages
            .iter()
            .filter(|package| in_scope(&package.company, company_scopes))
            .find(|package| package_matches(&package.key, &package.display_name, key))
            .map(PackageRecord::descriptor))
    }

    async fn fetch_package_items(&self, package_id: &str) -> Result<Vec<PackageItem>, StoreError> {
        let catalog = self.load_catalog().await?;
        Ok(catalog
            .packages
            .iter()
            .find(|package| package.id == package_id)
            .map(PackageRecord::items)
            .unwrap_or_default())
    }

    async fn download_template(
        &self,
        key: &str,
        company_hint: Option<&str>,
        format: TemplateFormat,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StoreError> {
        let file_name = format!("{key}.{}", format.extension());
        for company_dir in self.company_dirs(company_hint).await? {
            let candidate = company_dir.join(key).join(&file_name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                let copied = Self::copy_into(&candidate, dest_dir, key, format.extension()).await?;
                return Ok(Some(copied));
            }
        }
        Ok(None)
    }

    async fn download_intro_outro_asset(
        &self,
        name: &str,
        company_hint: Option<&str>,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StoreError> {
        let file_name = format!("{name}.pdf");
        let mut candidates = Vec::new();
        if let Some(company) = company_hint {
            candidates.push(self.root.join(company).join(INTRO_OUTRO_DIR).join(&file_name));
        }
        candidates.push(self.root.join(INTRO_OUTRO_DIR).join(&file_name));

        for candidate in candidates {
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Self::copy_into(&candidate, dest_dir, name, "pdf").await.map(Some);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::store::{FsTemplateStore, TemplateFormat, TemplateStore};

    const CATALOG: &str = r#"
[[locations]]
key = "the_gateway"
display_name = "The Gateway"
series = "The Landmark Series"
company = "backlite_dubai"
sov_percent = 0.125
upload_fee = 2000

[[locations]]
key = "heathrow_t5"
display_name = "Heathrow T5"
company = "backlite_uk"
storage = { kind = "traditional", asset_keys = ["t5_north", "t5_south"] }

[[packages]]
id = "pkg-001"
key = "mall_bundle"
display_name = "Mall Bundle"
company = "backlite_dubai"
networks = ["dubai_mall", "mall_of_emirates"]
"#;

    fn store_fixture() -> (TempDir, FsTemplateStore) {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("catalog.toml"), CATALOG).expect("catalog");
        let template_dir = dir.path().join("backlite_dubai").join("the_gateway");
        fs::create_dir_all(&template_dir).expect("template dir");
        fs::write(template_dir.join("the_gateway.pdf"), b"%PDF-1.5 stub").expect("template");
        fs::create_dir_all(dir.path().join("intro_outro")).expect("asset dir");
        fs::write(dir.path().join("intro_outro").join("landmark_series.pdf"), b"%PDF-1.5 asset")
            .expect("asset");
        let store = FsTemplateStore::new(dir.path(), "catalog.toml");
        (dir, store)
    }

    #[tokio::test]
    async fn catalog_is_filtered_by_company_scope() {
        let (_dir, store) = store_fixture();

        let all = store.fetch_location_catalog(&[]).await.expect("catalog");
        assert_eq!(all.len(), 2);

        let scoped = store.fetch_location_catalog(&["backlite_uk".to_string()]).await.expect("catalog");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].display_name, "Heathrow T5");
    }

    #[tokio::test]
    async fn packages_resolve_by_key_or_display_name() {
        let (_dir, store) = store_fixture();

        let by_name = store.fetch_package("mall bundle", &[]).await.expect("lookup");
        assert_eq!(by_name.as_ref().map(|package| package.id.as_str()), Some("pkg-001"));

        let out_of_scope =
            store.fetch_package("mall_bundle", &["backlite_uk".to_string()]).await.expect("lookup");
        assert!(out_of_scope.is_none());

        let items = store.fetch_package_items("pkg-001").await.expect("items");
        let keys: Vec<&str> = items.iter().map(|item| item.network_key.as_str()).collect();
        assert_eq!(keys, vec!["dubai_mall", "mall_of_emirates"]);
    }

    #[tokio::test]
    async fn downloads_copy_into_destination_and_leave_originals() {
        let (dir, store) = store_fixture();
        let workspace = TempDir::new().expect("workspace");

        let downloaded = store
            .download_template("the_gateway", None, TemplateFormat::Pdf, workspace.path())
            .await
            .expect("download")
            .expect("template exists");
        assert!(downloaded.starts_with(workspace.path()));
        assert!(dir.path().join("backlite_dubai/the_gateway/the_gateway.pdf").exists());

        let missing = store
            .download_template("the_gateway", None, TemplateFormat::Deck, workspace.path())
            .await
            .expect("download");
        assert!(missing.is_none());

        let asset = store
            .download_intro_outro_asset("landmark_series", Some("backlite_dubai"), workspace.path())
            .await
            .expect("asset download");
        assert!(asset.is_some());
    }
}
