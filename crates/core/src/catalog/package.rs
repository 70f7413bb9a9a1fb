use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::catalog::LocationCatalog;
use crate::domain::package::{GenerationTarget, PackageDescriptor};
use crate::store::{with_timeout, StoreError, TemplateStore};

#[derive(Clone, Debug, PartialEq)]
pub struct Expansion {
    pub targets: Vec<GenerationTarget>,
    /// Network keys listed by the package but absent from the catalog.
    pub missing: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExpansionError {
    #[error("package `{package}` expands to no known networks")]
    NoTargets { package: String, missing: Vec<String> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Detects package references and expands them into generation targets.
pub struct PackageExpander<'a> {
    store: &'a dyn TemplateStore,
    catalog: &'a LocationCatalog,
    company_scopes: &'a [String],
    timeout: Duration,
}

impl<'a> PackageExpander<'a> {
    pub fn new(
        store: &'a dyn TemplateStore,
        catalog: &'a LocationCatalog,
        company_scopes: &'a [String],
        timeout: Duration,
    ) -> Self {
        Self { store, catalog, company_scopes, timeout }
    }

    pub async fn find_package(&self, key: &str) -> Result<Option<PackageDescriptor>, StoreError> {
        with_timeout(self.timeout, "package lookup", self.store.fetch_package(key, self.company_scopes))
            .await
    }

    /// Targets follow the package's stored item order. Items whose network
    /// has no catalog record are skipped and reported in `missing`.
    pub async fn expand(&self, package: &PackageDescriptor) -> Result<Expansion, ExpansionError> {
        let items =
            with_timeout(self.timeout, "package items", self.store.fetch_package_items(&package.id))
                .await?;

        let mut targets = Vec::with_capacity(items.len());
        let mut missing = Vec::new();
        for item in items {
            match self.catalog.get(item.network_key.as_str()) {
                Some(network) => targets.push(GenerationTarget::from_network(network.clone())),
                None => {
                    warn!(
                        event_name = "package.network_missing",
                        package = %package.key,
                        network = %item.network_key,
                        "package network has no catalog record"
                    );
                    missing.push(item.network_key.to_string());
                }
            }
        }

        if targets.is_empty() {
            return Err(ExpansionError::NoTargets { package: package.display_name.clone(), missing });
        }
        Ok(Expansion { targets, missing })
    }
}
