use secrecy::ExposeSecret;
use serde::Serialize;
use tokenbot_core::config::{AppConfig, LoadOptions};
use tokenbot_db::{connect_with_config, migrations};

use crate::commands::{exit, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { exit::CHECKS_FAILED } else { 0 };

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

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_request_verification(&config));
            checks.push(check_reporting_sinks(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["request_verification", "reporting_sinks", "database_schema"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready, with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_request_verification(config: &AppConfig) -> DoctorCheck {
    let name = "request_verification";
    if config.slack.signing_secret.as_ref().is_some_and(|secret| !secret.expose_secret().is_empty())
    {
        DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: "verification token and signing secret configured".to_string(),
        }
    } else {
        DoctorCheck {
            name,
            status: CheckStatus::Warn,
            details: "no slack.signing_secret; requests are checked by verification token only"
                .to_string(),
        }
    }
}

fn check_reporting_sinks(config: &AppConfig) -> DoctorCheck {
    let mut enabled = Vec::new();
    if config.reporting.spreadsheet_url.is_some() {
        enabled.push("spreadsheet");
    }
    if config.reporting.dashboard_access_key.is_some() {
        enabled.push("dashboard");
    }

    if enabled.is_empty() {
        DoctorCheck {
            name: "reporting_sinks",
            status: CheckStatus::Warn,
            details: "no reporting sinks configured; grants are only stored and announced"
                .to_string(),
        }
    } else {
        DoctorCheck {
            name: "reporting_sinks",
            status: CheckStatus::Pass,
            details: format!("enabled: {}", enabled.join(", ")),
        }
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let name = "database_schema";
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| format!("failed to read migration state: {error}"));
        pool.close().await;
        applied
    });

    match result {
        Ok(0) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!(
                "connected using `{}` but no migrations are applied; run `tokenbot migrate`",
                config.database.url
            ),
        },
        Ok(applied) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("connected using `{}` ({applied} migrations applied)", config.database.url),
        },
        Err(error) => DoctorCheck { name, status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
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
