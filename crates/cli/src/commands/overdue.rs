use chrono::{DateTime, Utc};

use crate::commands::{
    load_config, open_pool, runtime, services, to_data, CommandResult, StepFailure,
};

/// Lists active levels past their timeout at `at` (RFC 3339), or now when omitted.
pub fn run(at: Option<&str>) -> CommandResult {
    let at = match at.map(DateTime::parse_from_rfc3339).transpose() {
        Ok(parsed) => parsed.map(|value| value.with_timezone(&Utc)).unwrap_or_else(Utc::now),
        Err(error) => {
            return CommandResult::failure(
                "overdue",
                "invalid_argument",
                format!("--at must be an RFC 3339 timestamp: {error}"),
                2,
            );
        }
    };

    let config = match load_config("overdue") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("overdue") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let overdue = services(&pool, &config)
            .engine
            .list_overdue(at)
            .await
            .map_err(|error| ("engine_read", error.to_string(), 6u8));
        pool.close().await;

        let overdue = overdue?;
        Ok::<_, StepFailure>((overdue.len(), to_data(&overdue)?))
    });

    match result {
        Ok((count, data)) => CommandResult::success_with_data(
            "overdue",
            format!("{count} overdue approval levels as of {}", at.to_rfc3339()),
            Some(data),
        ),
        Err(failure) => CommandResult::from_step("overdue", failure),
    }
}
