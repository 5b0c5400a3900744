use merit_core::domain::employee::EmployeeId;

use crate::commands::{
    load_config, open_pool, runtime, services, to_data, CommandResult, StepFailure,
};

pub fn run(approver: &str) -> CommandResult {
    let approver = approver.trim();
    if approver.is_empty() {
        return CommandResult::failure("pending", "invalid_argument", "approver id is required", 2);
    }

    let config = match load_config("pending") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("pending") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let pending = services(&pool, &config)
            .engine
            .list_pending_for(&EmployeeId(approver.to_owned()))
            .await
            .map_err(|error| ("engine_read", error.to_string(), 6u8));
        pool.close().await;

        let pending = pending?;
        Ok::<_, StepFailure>((pending.len(), to_data(&pending)?))
    });

    match result {
        Ok((count, data)) => CommandResult::success_with_data(
            "pending",
            format!("{count} pending approvals for {approver}"),
            Some(data),
        ),
        Err(failure) => CommandResult::from_step("pending", failure),
    }
}
