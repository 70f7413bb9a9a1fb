use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::proposal::{ProposalMode, ValidatedProposal};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Single,
    Separate,
    Combined,
}

impl GenerationMode {
    pub fn select(requested: ProposalMode, proposals: &[ValidatedProposal]) -> Self {
        match requested {
            ProposalMode::Combined
                if proposals.len() >= 2
                    || proposals.first().map(ValidatedProposal::is_package).unwrap_or(false) =>
            {
                Self::Combined
            }
            ProposalMode::Separate if proposals.len() == 1 => Self::Single,
            _ => Self::Separate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Separate => "separate",
            Self::Combined => "combined",
        }
    }
}

/// Which side of each location's template survives assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryTrim {
    pub keep_opening: bool,
    pub keep_closing: bool,
}

impl BoundaryTrim {
    pub const KEEP_BOTH: Self = Self { keep_opening: true, keep_closing: true };
    pub const STRIP_BOTH: Self = Self { keep_opening: false, keep_closing: false };

    /// With a global intro/outro every location loses both boundary pages.
    /// Without one, the first location keeps its opening page, the last keeps
    /// its closing page and middle locations keep neither.
    pub fn for_position(position: usize, count: usize, bracketed: bool) -> Self {
        if bracketed {
            return Self::STRIP_BOTH;
        }
        Self { keep_opening: position == 0, keep_closing: position + 1 == count }
    }

    /// Zero-based page indices to keep out of `page_count`, in document order.
    pub fn pages(&self, page_count: usize) -> Vec<usize> {
        let last = page_count.saturating_sub(1);
        (0..page_count)
            .filter(|&page| (page != 0 || self.keep_opening) && (page != last || self.keep_closing))
            .collect()
    }
}

/// Artifacts produced for one location or package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderResult {
    /// Already-final template plus a separately rendered summary page.
    PdfFirst { template: PathBuf, page_count: usize, keep_pages: Vec<usize>, summary: Option<PathBuf> },
    /// Editable deck with the summary inserted, converted as a whole.
    Converted { document: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPath {
    Template,
    Deck,
    Package,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationBreakdown {
    pub location: String,
    pub display_name: String,
    pub start_date: String,
    pub end_dates: Vec<String>,
    pub durations: Vec<String>,
    pub net_rates: Vec<String>,
    pub vat_amounts: Vec<String>,
    pub total_amounts: Vec<String>,
    pub rendered_via: RenderPath,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalOutcome {
    pub request_id: String,
    pub mode: GenerationMode,
    pub is_single: bool,
    pub document: PathBuf,
    pub filename: String,
    pub breakdown: Vec<LocationBreakdown>,
    pub total_amount: String,
    pub locations_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
