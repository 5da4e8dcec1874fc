use peerbook_core::config::LoadOptions;

use crate::commands::{build_runtime, load_config, open_database, CommandFailure, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    match execute(options) {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure.into_result("migrate"),
    }
}

fn execute(options: &LoadOptions) -> Result<(), CommandFailure> {
    let config = load_config(options)?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        pool.close().await;
        tracing::info!(
            event_name = "cli.migrate.completed",
            database_url = %config.database.url,
            "migrations applied"
        );
        Ok::<(), CommandFailure>(())
    })
}
