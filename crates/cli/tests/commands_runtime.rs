use std::env;
use std::sync::{Mutex, OnceLock};

use merit_cli::commands::{config, migrate, overdue, pending, seed, start};
use serde_json::Value;

#[test]
fn start_returns_success_with_valid_env() {
    with_env(&[("MERIT_DATABASE_URL", "sqlite::memory:"), ("MERIT_DATABASE_MAX_CONNECTIONS", "1")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("0 roles"));
        assert!(message.contains("admin role `workflow_admin` missing"));
    });
}

#[test]
fn start_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("MERIT_DATABASE_URL", "postgres://localhost/merit")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("MERIT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_starts_demo_awards_on_the_matching_workflows() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = database_url(&dir);

    with_env(&[("MERIT_DATABASE_URL", url.as_str())], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("  - awd-demo-001: Standard merit award"));
        assert!(message.contains("  - awd-demo-002: Large sales award"));

        let preflight = parse_payload(&start::run().output);
        let preflight_message = preflight["message"].as_str().unwrap_or("");
        assert!(preflight_message.contains("4 roles, 2 active workflow definitions"));
        assert!(preflight_message.contains("`workflow_admin` defined"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = database_url(&dir);

    with_env(&[("MERIT_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);

        assert_eq!(first_payload["message"], second_payload["message"]);

        let queue = parse_payload(&pending::run("emp-mgr").output);
        assert_eq!(queue["data"].as_array().map(Vec::len), Some(2), "no duplicate instances");
    });
}

#[test]
fn pending_lists_the_first_level_for_the_subject_manager() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = database_url(&dir);

    with_env(&[("MERIT_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let manager = parse_payload(&pending::run("emp-mgr").output);
        assert_eq!(manager["status"], "ok");
        assert_eq!(manager["message"], "2 pending approvals for emp-mgr");
        let first = &manager["data"][0];
        assert_eq!(first["level_order"], 1);

        let finance = parse_payload(&pending::run("emp-fin").output);
        assert_eq!(finance["message"], "0 pending approvals for emp-fin");

        let blank = pending::run("  ");
        assert_eq!(blank.exit_code, 2);
        assert_eq!(parse_payload(&blank.output)["error_class"], "invalid_argument");
    });
}

#[test]
fn overdue_reports_levels_past_their_timeout() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = database_url(&dir);

    with_env(&[("MERIT_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let now = parse_payload(&overdue::run(None).output);
        assert_eq!(now["status"], "ok");
        assert_eq!(now["data"].as_array().map(Vec::len), Some(0));

        let later = parse_payload(&overdue::run(Some("2999-01-01T00:00:00Z")).output);
        assert_eq!(later["data"].as_array().map(Vec::len), Some(2));
        assert_eq!(later["data"][0]["approver_id"], "emp-mgr");

        let invalid = overdue::run(Some("next tuesday"));
        assert_eq!(invalid.exit_code, 2);
        assert_eq!(parse_payload(&invalid.output)["error_class"], "invalid_argument");
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("MERIT_LOG_LEVEL", "debug"), ("MERIT_WORKFLOW_ADMIN_ROLE", "HR_Admin")], || {
        let output = config::run();
        assert!(output.contains("- logging.level = debug (source: env (MERIT_LOG_LEVEL))"));
        assert!(output
            .contains("- workflow.admin_role = hr_admin (source: env (MERIT_WORKFLOW_ADMIN_ROLE))"));
        assert!(output.contains("- server.port = 8080 (source: default)"));
    });
}

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("merit.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "MERIT_DATABASE_URL",
        "MERIT_DATABASE_MAX_CONNECTIONS",
        "MERIT_DATABASE_TIMEOUT_SECS",
        "MERIT_SERVER_BIND_ADDRESS",
        "MERIT_SERVER_PORT",
        "MERIT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "MERIT_LOGGING_LEVEL",
        "MERIT_LOGGING_FORMAT",
        "MERIT_LOG_LEVEL",
        "MERIT_LOG_FORMAT",
        "MERIT_WORKFLOW_REJECT_COMMENT_MIN_CHARS",
        "MERIT_WORKFLOW_DEFAULT_TIMEOUT_DAYS",
        "MERIT_WORKFLOW_ADMIN_ROLE",
        "MERIT_WORKFLOW_NOTIFICATION_LINK_BASE",
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
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
