//! Embedded schema migrations.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::PgPool;
use crate::error::{PostgresError, PostgresResult};

/// (version, description, sql) in the order they must be applied.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    20250301000001,
    "initial_schema",
    include_str!("../../migrations/20250301000001_initial_schema.sql"),
)];

fn build_migrations() -> Vec<Migration> {
    MIGRATIONS
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Apply every pending migration.
///
/// Applied versions are tracked in `_sqlx_migrations`.
///
/// # Errors
///
/// Returns an error if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> PostgresResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running database migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| PostgresError::Migration(e.to_string()))?;

    info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_non_empty() {
        let migrations = build_migrations();
        assert!(!migrations.is_empty());
        assert!(migrations.windows(2).all(|w| w[0].version < w[1].version));
        assert!(migrations.iter().all(|m| !m.sql.trim().is_empty()));
    }

    #[test]
    fn schema_defines_every_table() {
        let sql = MIGRATIONS[0].2;
        for table in ["users", "tokens", "docs", "users_docs_grant"] {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")),
                "missing table {table}"
            );
        }
    }
}
