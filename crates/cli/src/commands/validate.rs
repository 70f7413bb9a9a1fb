use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deckyard_core::config::ConfigOverrides;
use deckyard_core::document::{ConversionGate, SofficeConverter};
use deckyard_core::proposal::{ProcessorSettings, ProposalProcessor};
use deckyard_core::store::FsTemplateStore;

use crate::commands::{load_config, read_request, runtime, CommandResult};
use crate::logging;

const COMMAND: &str = "validate";

#[derive(Clone, Debug)]
pub struct ValidateOptions {
    pub config_path: Option<PathBuf>,
    pub request: PathBuf,
}

/// Catalog and package lookups only; no converter is started.
pub fn run(options: &ValidateOptions) -> CommandResult {
    let config = match load_config(COMMAND, options.config_path.as_deref(), ConfigOverrides::default()) {
        Ok(config) => config,
        Err(result) => return result,
    };
    logging::init(&config.logging);

    let request = match read_request(COMMAND, &options.request) {
        Ok(request) => request,
        Err(result) => return result,
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let binary = config.conversion.binary.clone().unwrap_or_else(|| PathBuf::from("soffice"));
        let gate = ConversionGate::new(Arc::new(SofficeConverter::new(binary)), 1, Duration::from_secs(1));
        let store = FsTemplateStore::new(&config.storage.root, &config.storage.catalog_file);
        let processor =
            match ProposalProcessor::new(Arc::new(store), gate, ProcessorSettings::from(&config.proposal)) {
                Ok(processor) => processor,
                Err(error) => return CommandResult::failure(COMMAND, "startup", error.to_string(), 1),
            };

        match processor.validate(&request).await {
            Ok(validated) => CommandResult::with_data(
                COMMAND,
                0,
                None,
                format!("{} proposal(s) are valid", validated.proposals.len()),
                serde_json::to_value(&validated).ok(),
            ),
            Err(failure) => CommandResult::with_data(
                COMMAND,
                1,
                Some(failure.event_name()),
                failure.to_string(),
                Some(serde_json::json!({ "errors": failure.messages() })),
            ),
        }
    })
}
