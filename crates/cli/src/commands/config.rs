use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use deckyard_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(config_path: Option<&Path>) -> String {
    let options = LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = config_path.map(Path::to_path_buf).or_else(detect_config_path);
    let file_doc = load_config_file_doc(file_path.as_deref());
    let source = |key: &str| field_source(key, file_doc.as_ref(), file_path.as_deref());

    let scopes = if config.proposal.company_scopes.is_empty() {
        "<all>".to_string()
    } else {
        config.proposal.company_scopes.join(", ")
    };
    let binary = config
        .conversion
        .binary
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<discover soffice/libreoffice on PATH>".to_string());

    let fields: Vec<(&str, String)> = vec![
        ("storage.root", config.storage.root.display().to_string()),
        ("storage.catalog_file", config.storage.catalog_file.clone()),
        ("conversion.binary", binary),
        ("conversion.max_concurrent", config.conversion.max_concurrent.to_string()),
        ("conversion.timeout_secs", config.conversion.timeout_secs.to_string()),
        ("proposal.output_dir", config.proposal.output_dir.display().to_string()),
        ("proposal.premium_series", config.proposal.premium_series.clone()),
        ("proposal.currency", config.proposal.currency.clone()),
        ("proposal.vat_rate", config.proposal.vat_rate.to_string()),
        ("proposal.fallback_upload_fee", config.proposal.fallback_upload_fee.to_string()),
        ("proposal.municipality_fee", config.proposal.municipality_fee.to_string()),
        ("proposal.fetch_timeout_secs", config.proposal.fetch_timeout_secs.to_string()),
        ("proposal.render_parallelism", config.proposal.render_parallelism.to_string()),
        ("proposal.company_scopes", scopes),
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|(key, value)| render_line(key, value, source(key))));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("deckyard.toml"), PathBuf::from("config/deckyard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

/// `storage.root` is overridden by `DECKYARD_STORAGE_ROOT`, and so on.
fn env_key(key_path: &str) -> String {
    format!("DECKYARD_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn field_source(key_path: &str, config_file_doc: Option<&Value>, config_file_path: Option<&Path>) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
