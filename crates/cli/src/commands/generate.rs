use std::path::PathBuf;
use std::sync::Arc;

use deckyard_core::config::{AppConfig, ConfigOverrides};
use deckyard_core::document::{ConversionGate, SofficeConverter};
use deckyard_core::proposal::{InMemoryProposalLog, ProcessorSettings, ProposalLog, ProposalProcessor};
use deckyard_core::store::FsTemplateStore;
use deckyard_db::{connect, migrations, SqlProposalLogRepository};
use tracing::{info, warn};

use crate::commands::{load_config, read_request, runtime, CommandResult};
use crate::logging;

const COMMAND: &str = "generate";

#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub config_path: Option<PathBuf>,
    pub request: PathBuf,
    pub output_dir: Option<PathBuf>,
}

pub fn run(options: &GenerateOptions) -> CommandResult {
    let overrides = ConfigOverrides { output_dir: options.output_dir.clone(), ..ConfigOverrides::default() };
    let config = match load_config(COMMAND, options.config_path.as_deref(), overrides) {
        Ok(config) => config,
        Err(result) => return result,
    };
    logging::init(&config.logging);

    let request = match read_request(COMMAND, &options.request) {
        Ok(request) => request,
        Err(result) => return result,
    };
    let converter = match SofficeConverter::discover(config.conversion.binary.as_deref()) {
        Ok(converter) => converter,
        Err(error) => {
            return CommandResult::failure(COMMAND, "converter_unavailable", error.to_string(), 2);
        }
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let gate = ConversionGate::from_config(Arc::new(converter), &config.conversion);
        let store = FsTemplateStore::new(&config.storage.root, &config.storage.catalog_file);
        let processor =
            match ProposalProcessor::new(Arc::new(store), gate, ProcessorSettings::from(&config.proposal)) {
                Ok(processor) => processor.with_proposal_log(proposal_log(&config).await),
                Err(error) => return CommandResult::failure(COMMAND, "startup", error.to_string(), 1),
            };

        let response = processor.respond(request).await;
        let (exit_code, error_class, message) = if response.success {
            (0, None, "proposal generated".to_string())
        } else {
            (1, Some("proposal_failed"), response.error.clone().unwrap_or_else(|| "proposal failed".to_string()))
        };
        CommandResult::with_data(COMMAND, exit_code, error_class, message, serde_json::to_value(&response).ok())
    })
}

/// SQLite log when the database is reachable, otherwise an in-memory log.
async fn proposal_log(config: &AppConfig) -> Arc<dyn ProposalLog> {
    let pool = match connect(&config.database).await {
        Ok(pool) => pool,
        Err(error) => {
            warn!(event_name = "proposal_log.unavailable", error = %error, "proposal log database is unreachable");
            return Arc::new(InMemoryProposalLog::default());
        }
    };
    if let Err(error) = migrations::run_pending(&pool).await {
        warn!(event_name = "proposal_log.migration_failed", error = %error, "proposal log schema is not current");
        return Arc::new(InMemoryProposalLog::default());
    }
    info!(event_name = "proposal_log.ready", url = %config.database.url, "recording proposals to the database");
    Arc::new(SqlProposalLogRepository::new(pool))
}
