use std::path::Path;

use deckyard_core::config::{AppConfig, ConfigOverrides};
use deckyard_core::document::SofficeConverter;
use deckyard_core::store::FsTemplateStore;
use deckyard_db::connect;
use serde::Serialize;

use crate::commands::{load_config, runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: "skipped because configuration did not load".to_string() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exit code 0 when every check passes, 1 otherwise.
pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = u8::from(report.overall_status != CheckStatus::Pass);

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };
    CommandResult { exit_code, output }
}

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match load_config("doctor", config_path, ConfigOverrides::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_converter(&config));
            checks.push(check_storage_root(&config));
            checks.extend(check_async(&config));
        }
        Err(result) => {
            checks.push(DoctorCheck::fail("config_validation", result.output));
            for name in ["converter_available", "storage_root", "catalog_readable", "database_connectivity"] {
                checks.push(DoctorCheck::skipped(name));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_converter(config: &AppConfig) -> DoctorCheck {
    match SofficeConverter::discover(config.conversion.binary.as_deref()) {
        Ok(converter) => DoctorCheck::pass("converter_available", format!("using `{}`", converter.binary().display())),
        Err(error) => DoctorCheck::fail("converter_available", error.to_string()),
    }
}

fn check_storage_root(config: &AppConfig) -> DoctorCheck {
    let root = &config.storage.root;
    if root.is_dir() {
        DoctorCheck::pass("storage_root", format!("`{}` exists", root.display()))
    } else {
        DoctorCheck::fail("storage_root", format!("`{}` is not a directory", root.display()))
    }
}

fn check_async(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(_) => {
            return vec![
                DoctorCheck::fail("catalog_readable", "failed to initialize async runtime"),
                DoctorCheck::fail("database_connectivity", "failed to initialize async runtime"),
            ];
        }
    };

    runtime.block_on(async {
        let store = FsTemplateStore::new(&config.storage.root, &config.storage.catalog_file);
        let catalog = match store.load_catalog().await {
            Ok(catalog) => DoctorCheck::pass(
                "catalog_readable",
                format!("{} location(s), {} package(s)", catalog.locations.len(), catalog.packages.len()),
            ),
            Err(error) => DoctorCheck::fail("catalog_readable", error.to_string()),
        };

        let database = match connect(&config.database).await {
            Ok(pool) => {
                pool.close().await;
                DoctorCheck::pass("database_connectivity", format!("connected using `{}`", config.database.url))
            }
            Err(error) => DoctorCheck::fail("database_connectivity", format!("failed to connect to database: {error}")),
        };

        vec![catalog, database]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
