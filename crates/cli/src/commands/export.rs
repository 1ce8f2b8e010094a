use std::fs;
use std::path::Path;

use anyhow::Context;
use tokenbot_core::{Grant, GrantStore};
use tokenbot_db::{connect_with_config, SqlGrantRepository};

use crate::commands::{exit, load_config, runtime, CommandResult};

/// Dumps every stored grant in insertion order. Without `output` the JSON
/// array itself is the command output so it can be piped.
pub fn run(output: Option<&Path>) -> CommandResult {
    let config = match load_config("export") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("export") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let grants = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string()))?;
        let stored = SqlGrantRepository::new(pool.clone())
            .list(None)
            .await
            .map_err(|error| ("grant_store", error.to_string()));
        pool.close().await;
        stored
    });

    let grants: Vec<Grant> = match grants {
        Ok(stored) => stored.into_iter().map(|stored| stored.grant).collect(),
        Err((error_class, message)) => {
            return CommandResult::failure("export", error_class, message, exit::DATABASE);
        }
    };

    match output {
        Some(path) => match write_grants(path, &grants) {
            Ok(()) => CommandResult::success(
                "export",
                format!("exported {} grants to {}", grants.len(), path.display()),
            ),
            Err(error) => CommandResult::failure("export", "io", format!("{error:#}"), exit::IO),
        },
        None => match serde_json::to_string_pretty(&grants) {
            Ok(json) => CommandResult { exit_code: 0, output: json },
            Err(error) => {
                CommandResult::failure("export", "serialization", error.to_string(), exit::IO)
            }
        },
    }
}

fn write_grants(path: &Path, grants: &[Grant]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(grants).context("failed to serialize grants")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
