use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub conversion: ConversionConfig,
    pub proposal: ProposalConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub catalog_file: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversionConfig {
    /// Explicit converter binary. When unset, `soffice`/`libreoffice` is looked up on PATH.
    pub binary: Option<PathBuf>,
    pub max_concurrent: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProposalConfig {
    pub output_dir: PathBuf,
    pub premium_series: String,
    pub currency: String,
    pub vat_rate: Decimal,
    pub fallback_upload_fee: Decimal,
    pub municipality_fee: Decimal,
    pub fetch_timeout_secs: u64,
    pub render_parallelism: usize,
    pub company_scopes: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub storage_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub converter_binary: Option<PathBuf>,
    pub max_concurrent_conversions: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

fn default_conversion_slots() -> usize {
    std::thread::available_parallelism().map(|cores| cores.get() * 2).unwrap_or(2)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                root: PathBuf::from("templates"),
                catalog_file: "catalog.toml".to_string(),
            },
            conversion: ConversionConfig {
                binary: None,
                max_concurrent: default_conversion_slots(),
                timeout_secs: 120,
            },
            proposal: ProposalConfig {
                output_dir: PathBuf::from("proposals"),
                premium_series: "The Landmark Series".to_string(),
                currency: "AED".to_string(),
                vat_rate: Decimal::new(5, 2),
                fallback_upload_fee: Decimal::new(3000, 0),
                municipality_fee: Decimal::new(520, 0),
                fetch_timeout_secs: 30,
                render_parallelism: 8,
                company_scopes: Vec::new(),
            },
            database: DatabaseConfig {
                url: "sqlite://deckyard.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deckyard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.storage.root.join(&self.storage.catalog_file)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(root) = storage.root {
                self.storage.root = root;
            }
            if let Some(catalog_file) = storage.catalog_file {
                self.storage.catalog_file = catalog_file;
            }
        }

        if let Some(conversion) = patch.conversion {
            if let Some(binary) = conversion.binary {
                self.conversion.binary = Some(binary);
            }
            if let Some(max_concurrent) = conversion.max_concurrent {
                self.conversion.max_concurrent = max_concurrent;
            }
            if let Some(timeout_secs) = conversion.timeout_secs {
                self.conversion.timeout_secs = timeout_secs;
            }
        }

        if let Some(proposal) = patch.proposal {
            if let Some(output_dir) = proposal.output_dir {
                self.proposal.output_dir = output_dir;
            }
            if let Some(premium_series) = proposal.premium_series {
                self.proposal.premium_series = premium_series;
            }
            if let Some(currency) = proposal.currency {
                self.proposal.currency = currency;
            }
            if let Some(vat_rate) = proposal.vat_rate {
                self.proposal.vat_rate = vat_rate;
            }
            if let Some(fallback_upload_fee) = proposal.fallback_upload_fee {
                self.proposal.fallback_upload_fee = fallback_upload_fee;
            }
            if let Some(municipality_fee) = proposal.municipality_fee {
                self.proposal.municipality_fee = municipality_fee;
            }
            if let Some(fetch_timeout_secs) = proposal.fetch_timeout_secs {
                self.proposal.fetch_timeout_secs = fetch_timeout_secs;
            }
            if let Some(render_parallelism) = proposal.render_parallelism {
                self.proposal.render_parallelism = render_parallelism;
            }
            if let Some(company_scopes) = proposal.company_scopes {
                self.proposal.company_scopes = company_scopes;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DECKYARD_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(value);
        }
        if let Some(value) = read_env("DECKYARD_STORAGE_CATALOG_FILE") {
            self.storage.catalog_file = value;
        }

        if let Some(value) = read_env("DECKYARD_CONVERSION_BINARY") {
            self.conversion.binary = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("DECKYARD_CONVERSION_MAX_CONCURRENT") {
            self.conversion.max_concurrent =
                parse_env("DECKYARD_CONVERSION_MAX_CONCURRENT", &value)?;
        }
        if let Some(value) = read_env("DECKYARD_CONVERSION_TIMEOUT_SECS") {
            self.conversion.timeout_secs = parse_env("DECKYARD_CONVERSION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DECKYARD_PROPOSAL_OUTPUT_DIR") {
            self.proposal.output_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_PREMIUM_SERIES") {
            self.proposal.premium_series = value;
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_CURRENCY") {
            self.proposal.currency = value;
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_VAT_RATE") {
            self.proposal.vat_rate = parse_env("DECKYARD_PROPOSAL_VAT_RATE", &value)?;
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_FALLBACK_UPLOAD_FEE") {
            self.proposal.fallback_upload_fee =
                parse_env("DECKYARD_PROPOSAL_FALLBACK_UPLOAD_FEE", &value)?;
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_MUNICIPALITY_FEE") {
            self.proposal.municipality_fee =
                parse_env("DECKYARD_PROPOSAL_MUNICIPALITY_FEE", &value)?;
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_FETCH_TIMEOUT_SECS") {
            self.proposal.fetch_timeout_secs =
                parse_env("DECKYARD_PROPOSAL_FETCH_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_RENDER_PARALLELISM") {
            self.proposal.render_parallelism =
                parse_env("DECKYARD_PROPOSAL_RENDER_PARALLELISM", &value)?;
        }
        if let Some(value) = read_env("DECKYARD_PROPOSAL_COMPANY_SCOPES") {
            self.proposal.company_scopes = value
                .split(',')
                .map(str::trim)
                .filter(|scope| !scope.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = read_env("DECKYARD_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DECKYARD_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("DECKYARD_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DECKYARD_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("DECKYARD_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("DECKYARD_LOGGING_LEVEL").or_else(|| read_env("DECKYARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DECKYARD_LOGGING_FORMAT").or_else(|| read_env("DECKYARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(storage_root) = overrides.storage_root {
            self.storage.root = storage_root;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.proposal.output_dir = output_dir;
        }
        if let Some(binary) = overrides.converter_binary {
            self.conversion.binary = Some(binary);
        }
        if let Some(max_concurrent) = overrides.max_concurrent_conversions {
            self.conversion.max_concurrent = max_concurrent;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_conversion(&self.conversion)?;
        validate_proposal(&self.proposal)?;
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deckyard.toml"), PathBuf::from("config/deckyard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.root must not be empty".to_string()));
    }
    if storage.catalog_file.trim().is_empty() {
        return Err(ConfigError::Validation(
            "storage.catalog_file must name a TOML file under storage.root".to_string(),
        ));
    }
    Ok(())
}

fn validate_conversion(conversion: &ConversionConfig) -> Result<(), ConfigError> {
    if conversion.max_concurrent == 0 {
        return Err(ConfigError::Validation(
            "conversion.max_concurrent must be greater than zero".to_string(),
        ));
    }
    if conversion.timeout_secs == 0 || conversion.timeout_secs > 900 {
        return Err(ConfigError::Validation(
            "conversion.timeout_secs must be in range 1..=900".to_string(),
        ));
    }
    Ok(())
}

fn validate_proposal(proposal: &ProposalConfig) -> Result<(), ConfigError> {
    let currency = proposal.currency.trim();
    if currency.is_empty() || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "proposal.currency must be an alphabetic currency code such as `AED`".to_string(),
        ));
    }
    if proposal.vat_rate < Decimal::ZERO || proposal.vat_rate >= Decimal::ONE {
        return Err(ConfigError::Validation(
            "proposal.vat_rate must be a fraction in range 0..1 (e.g. 0.05)".to_string(),
        ));
    }
    if proposal.fallback_upload_fee < Decimal::ZERO || proposal.municipality_fee < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "proposal.fallback_upload_fee and proposal.municipality_fee must not be negative"
                .to_string(),
        ));
    }
    if proposal.fetch_timeout_secs == 0 || proposal.fetch_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "proposal.fetch_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if proposal.render_parallelism == 0 {
        return Err(ConfigError::Validation(
            "proposal.render_parallelism must be greater than zero".to_string(),
        ));
    }
    if proposal.premium_series.trim().is_empty() {
        return Err(ConfigError::Validation(
            "proposal.premium_series must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    conversion: Option<ConversionPatch>,
    proposal: Option<ProposalPatch>,
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    root: Option<PathBuf>,
    catalog_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversionPatch {
    binary: Option<PathBuf>,
    max_concurrent: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProposalPatch {
    output_dir: Option<PathBuf>,
    premium_series: Option<String>,
    currency: Option<String>,
    vat_rate: Option<Decimal>,
    fallback_upload_fee: Option<Decimal>,
    municipality_fee: Option<Decimal>,
    fetch_timeout_secs: Option<u64>,
    render_parallelism: Option<usize>,
    company_scopes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.proposal.currency == "AED", "default currency should be AED")?;
        ensure(config.proposal.vat_rate == Decimal::new(5, 2), "default VAT should be 5%")?;
        ensure(
            config.proposal.premium_series == "The Landmark Series",
            "default premium series should be set",
        )?;
        ensure(config.conversion.max_concurrent >= 2, "conversion gate should scale with cores")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DECKYARD_ASSETS", "/srv/decks");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deckyard.toml");
            fs::write(
                &path,
                r#"
[storage]
root = "${TEST_DECKYARD_ASSETS}/templates"

[proposal]
vat_rate = 0.05
municipality_fee = 600
company_scopes = ["backlite_dubai", "backlite_uk"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.storage.root == PathBuf::from("/srv/decks/templates"),
                "storage root should be interpolated from environment",
            )?;
            ensure(
                config.proposal.municipality_fee == Decimal::new(600, 0),
                "municipality fee should be read from file",
            )?;
            ensure(
                config.proposal.company_scopes.len() == 2,
                "company scopes should be read from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DECKYARD_ASSETS"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DECKYARD_LOG_LEVEL", "warn");
        env::set_var("DECKYARD_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["DECKYARD_LOG_LEVEL", "DECKYARD_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DECKYARD_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DECKYARD_PROPOSAL_COMPANY_SCOPES", "backlite_dubai, backlite_abudhabi");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deckyard.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[conversion]
max_concurrent = 3

[proposal]
company_scopes = ["from_file"]

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.conversion.max_concurrent == 3, "file value should beat defaults")?;
            ensure(
                config.proposal.company_scopes
                    == vec!["backlite_dubai".to_string(), "backlite_abudhabi".to_string()],
                "env company scopes should win over file",
            )?;
            Ok(())
        })();

        clear_vars(&["DECKYARD_DATABASE_URL", "DECKYARD_PROPOSAL_COMPANY_SCOPES"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DECKYARD_PROPOSAL_VAT_RATE", "5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("proposal.vat_rate")
            );
            ensure(has_message, "validation failure should mention proposal.vat_rate")
        })();

        clear_vars(&["DECKYARD_PROPOSAL_VAT_RATE"]);
        result
    }

    #[test]
    fn malformed_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DECKYARD_CONVERSION_MAX_CONCURRENT", "many");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "DECKYARD_CONVERSION_MAX_CONCURRENT"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["DECKYARD_CONVERSION_MAX_CONCURRENT"]);
        result
    }
}
