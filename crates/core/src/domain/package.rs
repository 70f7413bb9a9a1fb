use serde::{Deserialize, Serialize};

use crate::domain::location::{LocationKey, LocationMetadata, StorageAddressing};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub id: String,
    pub key: LocationKey,
    pub display_name: String,
    pub company: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageItem {
    pub network_key: LocationKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLevel {
    Network,
    Asset,
}

/// One underlying network a package renders into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationTarget {
    pub network: LocationMetadata,
    pub level: StorageLevel,
    pub storage_keys: Vec<String>,
}

impl GenerationTarget {
    pub fn from_network(network: LocationMetadata) -> Self {
        let (level, storage_keys) = match &network.storage {
            StorageAddressing::Traditional { asset_keys } if !asset_keys.is_empty() => {
                (StorageLevel::Asset, asset_keys.clone())
            }
            StorageAddressing::Traditional { .. } | StorageAddressing::Standalone => {
                (StorageLevel::Network, vec![network.template_key().to_owned()])
            }
        };
        Self { network, level, storage_keys }
    }

    pub fn network_key(&self) -> &LocationKey {
        &self.network.key
    }

    pub fn display_name(&self) -> &str {
        &self.network.display_name
    }

    pub fn company(&self) -> &str {
        &self.network.company
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::location::{LocationKey, LocationMetadata, StorageAddressing};

    use super::{GenerationTarget, StorageLevel};

    fn network(storage: StorageAddressing) -> LocationMetadata {
        LocationMetadata {
            key: LocationKey::new("dubai_mall_network"),
            display_name: "Dubai Mall Network".to_owned(),
            series: None,
            height: None,
            width: None,
            number_of_faces: 1,
            sov_percent: Decimal::ONE_HUNDRED,
            spot_duration_secs: 10,
            loop_duration_secs: 60,
            upload_fee: None,
            template: None,
            company: "backlite_dubai".to_owned(),
            storage,
        }
    }

    #[test]
    fn standalone_network_is_addressed_by_its_own_key() {
        let target = GenerationTarget::from_network(network(StorageAddressing::Standalone));
        assert_eq!(target.level, StorageLevel::Network);
        assert_eq!(target.storage_keys, vec!["dubai_mall_network".to_owned()]);
    }

    #[test]
    fn traditional_network_is_addressed_by_asset_keys() {
        let target = GenerationTarget::from_network(network(StorageAddressing::Traditional {
            asset_keys: vec!["mall_north".to_owned(), "mall_south".to_owned()],
        }));
        assert_eq!(target.level, StorageLevel::Asset);
        assert_eq!(target.storage_keys, vec!["mall_north".to_owned(), "mall_south".to_owned()]);
    }
}
