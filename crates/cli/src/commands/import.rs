use std::fs;
use std::path::Path;

use tokenbot_core::{Grant, GrantStore, StoreError, TokenCatalog};
use tokenbot_db::{connect_with_config, migrations, SqlGrantRepository};

use crate::commands::{exit, load_config, runtime, CommandResult};

/// Loads grants written by `export`. The whole file is validated before the
/// first insert; grants whose quota slot is already taken are skipped.
pub fn run(file: &Path) -> CommandResult {
    let grants = match read_grants(file) {
        Ok(grants) => grants,
        Err(failure) => return failure,
    };
    if let Err(message) = validate(&grants, &TokenCatalog::default()) {
        return CommandResult::failure("import", "import_validation", message, exit::INVALID_INPUT);
    }

    let config = match load_config("import") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("import") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let calendar = config.organization.calendar();

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), exit::DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), exit::MIGRATION))?;

        let repository = SqlGrantRepository::new(pool.clone());
        let mut imported = 0usize;
        let mut skipped = 0usize;
        for grant in &grants {
            match repository.insert(grant, &calendar.quota_period(grant.timestamp)).await {
                Ok(_) => imported += 1,
                Err(StoreError::Conflict(_)) => skipped += 1,
                Err(error) => {
                    pool.close().await;
                    return Err(("grant_store", error.to_string(), exit::DATABASE));
                }
            }
        }
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>((imported, skipped))
    });

    match result {
        Ok((imported, skipped)) => CommandResult::success(
            "import",
            format!("imported {imported} grants, skipped {skipped} duplicates"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("import", error_class, message, exit_code)
        }
    }
}

fn read_grants(file: &Path) -> Result<Vec<Grant>, CommandResult> {
    let raw = fs::read_to_string(file).map_err(|error| {
        CommandResult::failure(
            "import",
            "io",
            format!("failed to read {}: {error}", file.display()),
            exit::IO,
        )
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        CommandResult::failure(
            "import",
            "import_validation",
            format!("{} is not a grant export: {error}", file.display()),
            exit::INVALID_INPUT,
        )
    })
}

fn validate(grants: &[Grant], catalog: &TokenCatalog) -> Result<(), String> {
    for (index, grant) in grants.iter().enumerate() {
        if !catalog.is_valid(&grant.token_id) {
            return Err(format!("grant #{index}: unknown token `{}`", grant.token_id));
        }
        if grant.is_self_grant() {
            return Err(format!("grant #{index}: {} cannot grant a token to themselves", grant.giver));
        }
        if grant.reason.trim().is_empty() {
            return Err(format!("grant #{index}: reason is empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tokenbot_core::{Grant, TokenCatalog};

    use super::validate;

    fn grant(giver: &str, recipient: &str, token: &str) -> Grant {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).single().expect("valid timestamp");
        Grant::new(giver, recipient, token, "shipped the release", false, at)
    }

    #[test]
    fn accepts_known_tokens_between_different_users() {
        let catalog = TokenCatalog::default();
        let token = catalog.list_tokens()[0].id.clone();
        assert_eq!(validate(&[grant("@alice", "@bob", &token)], &catalog), Ok(()));
    }

    #[test]
    fn rejects_unknown_tokens_and_self_grants() {
        let catalog = TokenCatalog::default();
        let token = catalog.list_tokens()[0].id.clone();

        let unknown = validate(&[grant("@alice", "@bob", "token-nope")], &catalog)
            .expect_err("unknown token must fail");
        assert!(unknown.contains("token-nope"), "{unknown}");

        let selfish = validate(
            &[grant("@alice", "@bob", &token), grant("@carol", "@carol", &token)],
            &catalog,
        )
        .expect_err("self grant must fail");
        assert!(selfish.starts_with("grant #1"), "{selfish}");
    }
}
