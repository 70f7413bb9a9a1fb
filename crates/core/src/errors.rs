use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::convert::ConversionError;
use crate::document::DocumentError;
use crate::domain::outcome::ProposalOutcome;
use crate::render::SummaryError;
use crate::store::StoreError;

/// Input problems found before any rendering I/O. Positions are 1-based.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no proposals were provided")]
    EmptyRequest,
    #[error("proposal {position}: unknown location `{input}`")]
    UnknownLocation { position: usize, input: String },
    #[error("proposal {position} ({location}): at least one duration is required")]
    MissingDurations { position: usize, location: String },
    #[error(
        "proposal {position} ({location}): {durations} duration(s) but {rates} net rate(s) were provided"
    )]
    MismatchedRates { position: usize, location: String, durations: usize, rates: usize },
    #[error("proposal {position} ({location}): `{value}` is not a valid amount")]
    InvalidAmount { position: usize, location: String, value: String },
    #[error("combined proposals require a combined net rate")]
    MissingCombinedRate,
    #[error("combined net rate `{value}` is not a valid amount")]
    InvalidCombinedRate { value: String },
    #[error("combined proposals require at least two locations unless the only entry is a package")]
    CombinedTooFew,
    #[error("`{location}` is already included in package `{package}`; remove one of them")]
    PackageOverlap { location: String, package: String },
    #[error("proposal {position}: package `{package}` has no renderable networks")]
    EmptyPackage { position: usize, package: String },
    #[error("proposal {position}: catalog lookup failed: {message}")]
    Lookup { position: usize, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderCause {
    #[error("no template is available")]
    TemplateNotFound,
    #[error("none of the package networks had a template (missing: {})", .missing.join(", "))]
    PackageEmpty { missing: Vec<String> },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
}

/// Failure of one fan-out entry, carrying which location it belongs to.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{location}: {cause}")]
pub struct RenderError {
    pub index: usize,
    pub location: String,
    pub cause: RenderCause,
}

impl RenderError {
    pub fn new(index: usize, location: impl Into<String>, cause: impl Into<RenderCause>) -> Self {
        Self { index, location: location.into(), cause: cause.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProposalFailure {
    #[error("request failed validation with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),
    #[error("{} proposal(s) failed to render", .0.len())]
    Render(Vec<RenderError>),
    #[error("document assembly failed: {0}")]
    Assembly(#[from] DocumentError),
    #[error("document conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error("template store failed: {0}")]
    Store(#[from] StoreError),
    #[error("financial summary failed: {0}")]
    Summary(#[from] SummaryError),
    #[error("workspace i/o failed: {0}")]
    Workspace(String),
}

impl ProposalFailure {
    pub fn workspace(error: std::io::Error) -> Self {
        Self::Workspace(error.to_string())
    }

    /// Human-readable messages, one per underlying problem.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Validation(errors) => errors.iter().map(ToString::to_string).collect(),
            Self::Render(errors) => errors.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Render(_) => "render",
            Self::Assembly(_) => "assembly",
            Self::Conversion(_) => "conversion",
            Self::Store(_) => "store",
            Self::Summary(_) => "summary",
            Self::Workspace(_) => "workspace",
        }
    }
}

/// Serialisable result of one processing call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProposalOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ProposalResponse {
    pub fn from_result(result: Result<ProposalOutcome, ProposalFailure>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                warning: outcome.warning.clone(),
                outcome: Some(outcome),
                error: None,
                errors: Vec::new(),
            },
            Err(failure) => {
                let mut messages = failure.messages();
                let batched = matches!(failure, ProposalFailure::Validation(_)) || messages.len() > 1;
                if batched {
                    Self { success: false, outcome: None, error: None, errors: messages, warning: None }
                } else {
                    Self {
                        success: false,
                        outcome: None,
                        error: messages.pop(),
                        errors: Vec::new(),
                        warning: None,
                    }
                }
            }
        }
    }
}
