use merit_core::domain::workflow::DefinitionFilter;

use crate::commands::{load_config, open_pool, runtime, services, CommandResult, StepFailure};

/// Startup preflight: config, connectivity, schema, and whether the configured admin role exists.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("start") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let services = services(&pool, &config);

        let roles = services
            .directory
            .list_roles()
            .await
            .map_err(|error| ("directory_read", error.to_string(), 6u8))?;
        let active = services
            .registry
            .list(&DefinitionFilter { department_id: None, is_active: Some(true) })
            .await
            .map_err(|error| ("registry_read", error.to_string(), 6u8))?;
        let admin_defined = roles.iter().any(|role| role.code == config.workflow.admin_role);

        pool.close().await;
        Ok::<_, StepFailure>((roles.len(), active.len(), admin_defined))
    });

    match result {
        Ok((roles, definitions, admin_defined)) => {
            let admin = if admin_defined { "defined" } else { "missing" };
            CommandResult::success(
                "start",
                format!(
                    "preflight passed: {roles} roles, {definitions} active workflow definitions, admin role `{}` {admin}",
                    config.workflow.admin_role.0
                ),
            )
        }
        Err(failure) => CommandResult::from_step("start", failure),
    }
}
