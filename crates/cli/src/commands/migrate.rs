use std::path::Path;

use deckyard_core::config::ConfigOverrides;
use deckyard_db::{connect, migrations};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match load_config("migrate", config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database).await.map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => CommandResult::failure("migrate", error_class, message, exit_code),
    }
}
