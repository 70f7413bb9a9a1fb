use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::location::{LocationKey, LocationMetadata};
use crate::domain::package::{GenerationTarget, PackageDescriptor};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalMode {
    #[default]
    Separate,
    Combined,
}

/// One "location + campaign terms" line item as supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub location: String,
    #[serde(default)]
    pub durations: Vec<String>,
    #[serde(default, alias = "rates")]
    pub net_rates: Vec<String>,
    #[serde(default = "default_spots")]
    pub spots: u32,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub production_fee: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

fn default_spots() -> u32 {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequest {
    #[serde(alias = "proposals")]
    pub entries: Vec<LocationEntry>,
    #[serde(default, alias = "package_type")]
    pub mode: ProposalMode,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub submitted_by: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub combined_net_rate: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub company_scopes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalSubject {
    Location(LocationMetadata),
    Package {
        descriptor: PackageDescriptor,
        targets: Vec<GenerationTarget>,
        /// Keys of package networks with no catalog record. They have no
        /// display name, so warnings report them by key.
        missing_networks: Vec<String>,
    },
}

/// A line item that passed validation, enriched with catalog metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatedProposal {
    pub index: usize,
    pub key: LocationKey,
    pub display_name: String,
    pub subject: ProposalSubject,
    pub durations: Vec<String>,
    pub net_rates: Vec<Decimal>,
    pub spots: u32,
    pub start_date: String,
    pub end_dates: Vec<String>,
    pub production_fee: Option<Decimal>,
    pub payment_terms: Option<String>,
    pub company: String,
}

impl ValidatedProposal {
    pub fn is_package(&self) -> bool {
        matches!(self.subject, ProposalSubject::Package { .. })
    }

    /// Metadata used for series-based decisions. Packages answer with their
    /// first underlying network.
    pub fn metadata(&self) -> Option<&LocationMetadata> {
        match &self.subject {
            ProposalSubject::Location(metadata) => Some(metadata),
            ProposalSubject::Package { targets, .. } => {
                targets.first().map(|target| &target.network)
            }
        }
    }

    /// Upload fee of every location this proposal covers, in render order.
    pub fn upload_fees(&self) -> Vec<Option<Decimal>> {
        match &self.subject {
            ProposalSubject::Location(metadata) => vec![metadata.upload_fee],
            ProposalSubject::Package { targets, .. } => {
                targets.iter().map(|target| target.network.upload_fee).collect()
            }
        }
    }

    pub fn missing_networks(&self) -> &[String] {
        match &self.subject {
            ProposalSubject::Package { missing_networks, .. } => missing_networks,
            ProposalSubject::Location(_) => &[],
        }
    }
}
