pub mod intro_outro;
pub mod log;
pub mod processor;
pub mod validator;

pub use intro_outro::{IntroOutroCache, IntroOutroPages, IntroOutroSelection, IntroOutroSource};
pub use log::{InMemoryProposalLog, ProposalLog, ProposalLogEntry, ProposalLogError};
pub use processor::{ProcessorSettings, ProposalProcessor};
pub use validator::{ValidatedRequest, Validator};
