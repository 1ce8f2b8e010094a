use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use tokenbot_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use toml::Value;

struct Row {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Row {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for row in rows(&config) {
        let source = field_source(
            row.key,
            Some(row.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(row.key, &row.value, source));
    }

    lines.join("\n")
}

fn rows(config: &AppConfig) -> Vec<Row> {
    let database = &config.database;
    let slack = &config.slack;
    let organization = &config.organization;
    let reporting = &config.reporting;
    let server = &config.server;

    vec![
        Row::new("database.url", "TOKENBOT_DATABASE_URL", &database.url),
        Row::new(
            "database.max_connections",
            "TOKENBOT_DATABASE_MAX_CONNECTIONS",
            database.max_connections.to_string(),
        ),
        Row::new(
            "database.timeout_secs",
            "TOKENBOT_DATABASE_TIMEOUT_SECS",
            database.timeout_secs.to_string(),
        ),
        Row::new(
            "slack.bot_token",
            "TOKENBOT_SLACK_BOT_TOKEN",
            redact_token(slack.bot_token.expose_secret()),
        ),
        Row::new(
            "slack.verification_token",
            "TOKENBOT_SLACK_VERIFICATION_TOKEN",
            redact_secret(Some(&slack.verification_token)),
        ),
        Row::new(
            "slack.signing_secret",
            "TOKENBOT_SLACK_SIGNING_SECRET",
            redact_secret(slack.signing_secret.as_ref()),
        ),
        Row::new("slack.command", "TOKENBOT_SLACK_COMMAND", &slack.command),
        Row::new("slack.api_base_url", "TOKENBOT_SLACK_API_BASE_URL", &slack.api_base_url),
        Row::new(
            "slack.directory_ttl_secs",
            "TOKENBOT_SLACK_DIRECTORY_TTL_SECS",
            slack.directory_ttl_secs.to_string(),
        ),
        Row::new(
            "organization.time_zone",
            "TOKENBOT_ORGANIZATION_TIME_ZONE",
            &organization.time_zone,
        ),
        Row::new(
            "organization.announcement_channel",
            "TOKENBOT_ORGANIZATION_ANNOUNCEMENT_CHANNEL",
            &organization.announcement_channel,
        ),
        Row::new(
            "reporting.spreadsheet_url",
            "TOKENBOT_REPORTING_SPREADSHEET_URL",
            reporting.spreadsheet_url.as_deref().unwrap_or("<unset>"),
        ),
        Row::new("reporting.dashboard_url", "TOKENBOT_REPORTING_DASHBOARD_URL", &reporting.dashboard_url),
        Row::new(
            "reporting.dashboard_access_key",
            "TOKENBOT_REPORTING_DASHBOARD_ACCESS_KEY",
            redact_secret(reporting.dashboard_access_key.as_ref()),
        ),
        Row::new(
            "reporting.dashboard_stream",
            "TOKENBOT_REPORTING_DASHBOARD_STREAM",
            &reporting.dashboard_stream,
        ),
        Row::new(
            "reporting.timeout_secs",
            "TOKENBOT_REPORTING_TIMEOUT_SECS",
            reporting.timeout_secs.to_string(),
        ),
        Row::new("server.bind_address", "TOKENBOT_SERVER_BIND_ADDRESS", &server.bind_address),
        Row::new("server.port", "TOKENBOT_SERVER_PORT", server.port.to_string()),
        Row::new(
            "server.graceful_shutdown_secs",
            "TOKENBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            server.graceful_shutdown_secs.to_string(),
        ),
        Row::new("logging.level", "TOKENBOT_LOGGING_LEVEL", &config.logging.level),
        Row::new(
            "logging.format",
            "TOKENBOT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

/// Keeps the `xoxb-` style prefix so the token kind stays visible.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "<redacted>".to_string(),
        Some(_) => "<empty>".to_string(),
        None => "<unset>".to_string(),
    }
}
