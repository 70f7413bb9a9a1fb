pub mod audit;
pub mod catalog;
pub mod config;
pub mod document;
pub mod domain;
pub mod errors;
pub mod fixtures;
pub mod pricing;
pub mod proposal;
pub mod render;
pub mod schedule;
pub mod store;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use catalog::{LocationCatalog, PackageExpander};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use document::{ConversionGate, DocumentConverter, SofficeConverter};
pub use domain::location::{LocationKey, LocationMetadata};
pub use domain::outcome::{GenerationMode, ProposalOutcome};
pub use domain::proposal::{LocationEntry, ProposalMode, ProposalRequest, ValidatedProposal};
pub use errors::{ProposalFailure, ProposalResponse, RenderError, ValidationError};
pub use proposal::{ProcessorSettings, ProposalLog, ProposalLogEntry, ProposalProcessor};
pub use store::{FsTemplateStore, InMemoryTemplateStore, TemplateFormat, TemplateStore};
