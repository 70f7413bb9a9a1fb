pub mod package;

use crate::domain::location::{LocationKey, LocationMetadata};
use crate::store::normalize_name;

pub use package::{Expansion, ExpansionError, PackageExpander};

/// Snapshot of the location catalog for one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocationCatalog {
    locations: Vec<LocationMetadata>,
}

impl LocationCatalog {
    pub fn new(locations: Vec<LocationMetadata>) -> Self {
        Self { locations: locations.into_iter().map(LocationMetadata::normalized).collect() }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn locations(&self) -> &[LocationMetadata] {
        &self.locations
    }

    pub fn get(&self, key: &str) -> Option<&LocationMetadata> {
        self.locations.iter().find(|location| location.key.as_str().eq_ignore_ascii_case(key))
    }

    /// Exact key, then exact display name, then substring in either
    /// direction on normalized text. Catalog order breaks ties.
    pub fn resolve(&self, input: &str) -> Option<&LocationKey> {
        self.lookup(input).map(|location| &location.key)
    }

    pub fn lookup(&self, input: &str) -> Option<&LocationMetadata> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lowered = trimmed.to_lowercase();

        if let Some(location) =
            self.locations.iter().find(|location| location.key.as_str().to_lowercase() == lowered)
        {
            return Some(location);
        }

        if let Some(location) =
            self.locations.iter().find(|location| location.display_name.to_lowercase() == lowered)
        {
            return Some(location);
        }

        let wanted = normalize_name(trimmed);
        if wanted.is_empty() {
            return None;
        }
        self.locations.iter().find(|location| {
            [normalize_name(location.key.as_str()), normalize_name(&location.display_name)]
                .iter()
                .any(|candidate| {
                    !candidate.is_empty() && (candidate.contains(&wanted) || wanted.contains(candidate.as_str()))
                })
        })
    }
}

pub fn resolve(input: &str, catalog: &LocationCatalog) -> Option<LocationKey> {
    catalog.resolve(input).cloned()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::catalog::{resolve, LocationCatalog};
    use crate::domain::location::{LocationKey, LocationMetadata, StorageAddressing};

    fn location(key: &str, display_name: &str) -> LocationMetadata {
        LocationMetadata {
            key: LocationKey::new(key),
            display_name: display_name.to_owned(),
            series: None,
            height: None,
            width: None,
            number_of_faces: 1,
            sov_percent: Decimal::new(125, 3),
            spot_duration_secs: 10,
            loop_duration_secs: 80,
            upload_fee: None,
            template: None,
            company: "backlite_dubai".to_owned(),
            storage: StorageAddressing::Standalone,
        }
    }

    fn catalog() -> LocationCatalog {
        LocationCatalog::new(vec![
            location("the_gateway", "The Gateway"),
            location("dubai_gateway", "Dubai Gateway"),
            location("jawhara", "The Jawhara"),
        ])
    }

    #[test]
    fn exact_key_wins_over_display_name_and_substring() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("DUBAI_GATEWAY").map(LocationKey::as_str), Some("dubai_gateway"));
        assert_eq!(catalog.resolve("the gateway").map(LocationKey::as_str), Some("the_gateway"));
    }

    #[test]
    fn substring_matches_in_both_directions() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("jawhara").map(LocationKey::as_str), Some("jawhara"));
        assert_eq!(catalog.resolve("Jawhara tower").map(LocationKey::as_str), Some("jawhara"));
        assert_eq!(
            catalog.resolve("the jawhara billboard please").map(LocationKey::as_str),
            Some("jawhara")
        );
        assert_eq!(catalog.resolve("gateway").map(LocationKey::as_str), Some("the_gateway"));
    }

    #[test]
    fn resolution_is_deterministic_and_rejects_blank_input() {
        let catalog = catalog();
        let first = resolve("Gateway", &catalog);
        assert_eq!(first, resolve("Gateway", &catalog));
        assert_eq!(resolve("   ", &catalog), None);
        assert_eq!(resolve("Mall of the Emirates", &catalog), None);
    }

    #[test]
    fn fractional_sov_is_normalized_on_load() {
        let catalog = catalog();
        assert_eq!(catalog.get("the_gateway").map(|location| location.sov_percent), Some(Decimal::new(125, 1)));
    }
}
