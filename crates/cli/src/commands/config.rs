use std::env;
use std::fs;
use std::path::Path;

use merit_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let options = LoadOptions::default();
    let config_file_path = AppConfig::source_path(&options);
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let fields: [(&str, String, &[&str]); 13] = [
        ("database.url", config.database.url.clone(), &["MERIT_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["MERIT_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["MERIT_DATABASE_TIMEOUT_SECS"],
        ),
        ("server.bind_address", config.server.bind_address.clone(), &["MERIT_SERVER_BIND_ADDRESS"]),
        ("server.port", config.server.port.to_string(), &["MERIT_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["MERIT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        ("logging.level", config.logging.level.clone(), &["MERIT_LOGGING_LEVEL", "MERIT_LOG_LEVEL"]),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["MERIT_LOGGING_FORMAT", "MERIT_LOG_FORMAT"],
        ),
        (
            "workflow.reject_comment_min_chars",
            config.workflow.reject_comment_min_chars.to_string(),
            &["MERIT_WORKFLOW_REJECT_COMMENT_MIN_CHARS"],
        ),
        (
            "workflow.default_timeout_days",
            config.workflow.default_timeout_days.to_string(),
            &["MERIT_WORKFLOW_DEFAULT_TIMEOUT_DAYS"],
        ),
        ("workflow.admin_role", config.workflow.admin_role.0.clone(), &["MERIT_WORKFLOW_ADMIN_ROLE"]),
        (
            "workflow.notification_link_base",
            config.workflow.notification_link_base.clone(),
            &["MERIT_WORKFLOW_NOTIFICATION_LINK_BASE"],
        ),
        (
            "config_file",
            config_file_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<none>".to_string()),
            &[],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields.iter().map(|(key, value, env_keys)| render_line(key, value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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
