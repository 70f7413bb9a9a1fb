use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey(pub String);

impl LocationKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a network's mockups and templates are addressed in storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageAddressing {
    /// Content lives under the network's own key.
    #[default]
    Standalone,
    /// Content lives under one or more constituent asset keys.
    Traditional {
        #[serde(default)]
        asset_keys: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationMetadata {
    pub key: LocationKey,
    pub display_name: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default = "default_faces")]
    pub number_of_faces: u32,
    #[serde(default)]
    pub sov_percent: Decimal,
    #[serde(default)]
    pub spot_duration_secs: u32,
    #[serde(default)]
    pub loop_duration_secs: u32,
    #[serde(default)]
    pub upload_fee: Option<Decimal>,
    #[serde(default)]
    pub template: Option<String>,
    pub company: String,
    #[serde(default)]
    pub storage: StorageAddressing,
}

fn default_faces() -> u32 {
    1
}

impl LocationMetadata {
    /// Storage key of the location's presentation template.
    pub fn template_key(&self) -> &str {
        self.template.as_deref().unwrap_or(self.key.as_str())
    }

    pub fn dimensions(&self) -> Option<String> {
        match (&self.width, &self.height) {
            (Some(width), Some(height)) => Some(format!("{width} x {height}")),
            _ => None,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.sov_percent = normalize_sov(self.sov_percent);
        self
    }
}

/// Share-of-voice values below one are stored as fractions; display uses 0-100.
pub fn normalize_sov(value: Decimal) -> Decimal {
    if value < Decimal::ONE {
        (value * Decimal::ONE_HUNDRED).normalize()
    } else {
        value
    }
}
