use async_trait::async_trait;
use thiserror::Error;

use deckyard_core::proposal::ProposalLogEntry;

pub mod proposal_log;

pub use proposal_log::SqlProposalLogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ProposalLogRepository: Send + Sync {
    async fn record(&self, entry: &ProposalLogEntry) -> Result<(), RepositoryError>;
    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ProposalLogEntry>, RepositoryError>;
    /// Most recent first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<ProposalLogEntry>, RepositoryError>;
    async fn list_for_submitter(&self, submitted_by: &str) -> Result<Vec<ProposalLogEntry>, RepositoryError>;
}
