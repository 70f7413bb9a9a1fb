use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use deckyard_cli::commands::{config, doctor, generate, migrate, validate, GenerateOptions, ValidateOptions};
use serde_json::Value;
use tempfile::TempDir;

const CATALOG: &str = r#"
[[locations]]
key = "the_gateway"
display_name = "The Gateway"
company = "backlite_dubai"
upload_fee = 3000

[[locations]]
key = "the_landmark"
display_name = "The Landmark"
series = "The Landmark Series"
company = "backlite_dubai"

[[packages]]
id = "pkg-1"
key = "dubai_premium"
display_name = "Dubai Premium"
company = "backlite_dubai"
networks = ["the_gateway", "the_landmark"]
"#;

#[test]
fn migrate_returns_success_with_memory_database() {
    with_env(&[("DECKYARD_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(None);
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_override() {
    with_env(&[("DECKYARD_CONVERSION_MAX_CONCURRENT", "many")], || {
        let result = migrate::run(None);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn validate_accepts_known_locations() {
    let storage = storage_with_catalog();
    let request = write_request(
        storage.path(),
        r#"{"proposals": [{"location": "The Gateway", "durations": ["4 Weeks"], "rates": ["AED 50,000"], "start_date": "1st December 2025"}]}"#,
    );

    with_storage_env(storage.path(), || {
        let result = validate::run(&ValidateOptions { config_path: None, request: request.clone() });
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "validate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["proposals"][0]["key"], "the_gateway");
        assert_eq!(payload["data"]["proposals"][0]["end_dates"][0], "29th December 2025");
    });
}

#[test]
fn validate_reports_every_problem_with_exit_code_one() {
    let storage = storage_with_catalog();
    let request = write_request(
        storage.path(),
        r#"{"proposals": [
            {"location": "Nowhere Tower", "durations": ["4 Weeks"], "rates": ["AED 10,000"]},
            {"location": "The Landmark", "durations": [], "rates": []}
        ]}"#,
    );

    with_storage_env(storage.path(), || {
        let result = validate::run(&ValidateOptions { config_path: None, request: request.clone() });
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "validation");
        let errors = payload["data"]["errors"].as_array().expect("errors array");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].as_str().unwrap_or_default().contains("Nowhere Tower"));
    });
}

#[test]
fn generate_rejects_unreadable_request_before_rendering() {
    let storage = storage_with_catalog();
    let missing = storage.path().join("missing.json");

    with_storage_env(storage.path(), || {
        let result = generate::run(&GenerateOptions { config_path: None, request: missing.clone(), output_dir: None });
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "generate");
        assert_eq!(payload["error_class"], "request_input");
    });
}

#[test]
fn config_attributes_values_to_their_source() {
    with_env(&[("DECKYARD_PROPOSAL_CURRENCY", "USD")], || {
        let output = config::run(None);
        assert!(output.contains("- proposal.currency = USD (source: env (DECKYARD_PROPOSAL_CURRENCY))"));
        assert!(output.contains("- logging.format = compact (source: default)"));
    });
}

#[test]
fn doctor_reports_missing_storage_as_failure() {
    let scratch = TempDir::new().expect("scratch");
    let missing_root = scratch.path().join("no-such-templates");

    with_env(
        &[
            ("DECKYARD_STORAGE_ROOT", missing_root.to_str().expect("utf-8 path")),
            ("DECKYARD_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = doctor::run(None, true);
            assert_eq!(result.exit_code, 1);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["overall_status"], "fail");
            let checks = payload["checks"].as_array().expect("checks array");
            let status_of = |name: &str| {
                checks.iter().find(|check| check["name"] == name).map(|check| check["status"].clone())
            };
            assert_eq!(status_of("config_validation"), Some(Value::from("pass")));
            assert_eq!(status_of("storage_root"), Some(Value::from("fail")));
            assert_eq!(status_of("catalog_readable"), Some(Value::from("fail")));
            assert_eq!(status_of("database_connectivity"), Some(Value::from("pass")));
        },
    );
}

fn storage_with_catalog() -> TempDir {
    let storage = TempDir::new().expect("storage dir");
    std::fs::write(storage.path().join("catalog.toml"), CATALOG).expect("write catalog");
    storage
}

fn write_request(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("request.json");
    std::fs::write(&path, body).expect("write request");
    path
}

fn with_storage_env(root: &Path, test_fn: impl FnOnce()) {
    let root = root.to_str().expect("utf-8 path").to_string();
    with_env(&[("DECKYARD_STORAGE_ROOT", &root), ("DECKYARD_DATABASE_URL", "sqlite::memory:")], test_fn);
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "DECKYARD_STORAGE_ROOT",
        "DECKYARD_STORAGE_CATALOG_FILE",
        "DECKYARD_CONVERSION_BINARY",
        "DECKYARD_CONVERSION_MAX_CONCURRENT",
        "DECKYARD_CONVERSION_TIMEOUT_SECS",
        "DECKYARD_PROPOSAL_OUTPUT_DIR",
        "DECKYARD_PROPOSAL_PREMIUM_SERIES",
        "DECKYARD_PROPOSAL_CURRENCY",
        "DECKYARD_PROPOSAL_VAT_RATE",
        "DECKYARD_PROPOSAL_FALLBACK_UPLOAD_FEE",
        "DECKYARD_PROPOSAL_MUNICIPALITY_FEE",
        "DECKYARD_PROPOSAL_FETCH_TIMEOUT_SECS",
        "DECKYARD_PROPOSAL_RENDER_PARALLELISM",
        "DECKYARD_PROPOSAL_COMPANY_SCOPES",
        "DECKYARD_DATABASE_URL",
        "DECKYARD_DATABASE_MAX_CONNECTIONS",
        "DECKYARD_DATABASE_TIMEOUT_SECS",
        "DECKYARD_LOGGING_LEVEL",
        "DECKYARD_LOGGING_FORMAT",
        "DECKYARD_LOG_LEVEL",
        "DECKYARD_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
