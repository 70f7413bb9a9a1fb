use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One generated proposal, as recorded for the sales audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalLogEntry {
    pub request_id: String,
    pub submitted_by: String,
    pub client_name: String,
    pub package_type: String,
    pub locations: String,
    pub total_amount: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProposalLogError {
    #[error("proposal log is unavailable: {0}")]
    Unavailable(String),
    #[error("proposal log write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait ProposalLog: Send + Sync {
    async fn log_proposal(&self, entry: &ProposalLogEntry) -> Result<(), ProposalLogError>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryProposalLog {
    entries: Arc<Mutex<Vec<ProposalLogEntry>>>,
}

impl InMemoryProposalLog {
    pub fn entries(&self) -> Vec<ProposalLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ProposalLog for InMemoryProposalLog {
    async fn log_proposal(&self, entry: &ProposalLogEntry) -> Result<(), ProposalLogError> {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry.clone()),
            Err(poisoned) => poisoned.into_inner().push(entry.clone()),
        }
        Ok(())
    }
}
