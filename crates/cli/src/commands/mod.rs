pub mod config;
pub mod doctor;
pub mod generate;
pub mod migrate;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use deckyard_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use deckyard_core::ProposalRequest;
use serde::Serialize;
use serde_json::Value;

pub use generate::GenerateOptions;
pub use validate::ValidateOptions;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::with_data(command, 0, None, message, None)
    }

    pub fn failure(command: &str, error_class: &str, message: impl Into<String>, exit_code: u8) -> Self {
        Self::with_data(command, exit_code, Some(error_class), message, None)
    }

    /// Full form; `error_class` is `None` for successful runs.
    pub fn with_data(
        command: &str,
        exit_code: u8,
        error_class: Option<&str>,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: if error_class.is_none() { "ok" } else { "error" }.to_string(),
            error_class: error_class.map(str::to_string),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loads configuration for `command`, mapping failures to exit code 2.
pub(crate) fn load_config(
    command: &str,
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<AppConfig, CommandResult> {
    let options = LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        overrides,
    };
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })
}

pub(crate) fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(command, "runtime_init", format!("failed to initialize async runtime: {error}"), 3)
    })
}

pub(crate) fn read_request(command: &str, path: &Path) -> Result<ProposalRequest, CommandResult> {
    load_request(path).map_err(|error| CommandResult::failure(command, "request_input", format!("{error:#}"), 2))
}

fn load_request(path: &Path) -> anyhow::Result<ProposalRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read request file `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("request file `{}` is not a valid proposal request", path.display()))
}
