/// Database migration runner
///
/// Migrations are embedded from `printstudio-shared/migrations/` at compile
/// time, one `{timestamp}_{name}.sql` file per step.
///
/// # Example
///
/// ```no_run
/// use printstudio_shared::db::migrations::{get_migration_status, run_migrations};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// run_migrations(&pool).await?;
///
/// let status = get_migration_status(&pool).await?;
/// println!("Applied {} migrations", status.applied_migrations);
/// # Ok(())
/// # }
/// ```

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPool;
use tracing::{debug, error, info};

/// Migration status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied_migrations: usize,

    /// Latest applied migration version (timestamp)
    pub latest_version: Option<i64>,

    /// Number of embedded migrations
    pub known_migrations: usize,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.applied_migrations >= self.known_migrations
    }
}

fn migrator() -> Migrator {
    sqlx::migrate!("./migrations")
}

/// Applies pending migrations; already applied ones are skipped
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    let migrator = migrator();
    info!(known = migrator.iter().count(), "Applying database migrations");

    migrator
        .run(pool)
        .await
        .inspect_err(|e| error!(error = %e, "Migration failed"))?;

    info!("Database schema up to date");
    Ok(())
}

/// Reports applied migrations against the embedded set
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let known_migrations = migrator().iter().count();

    let tracked: bool = sqlx::query_scalar("SELECT to_regclass('public._sqlx_migrations') IS NOT NULL")
        .fetch_one(pool)
        .await?;

    if !tracked {
        debug!("No migrations applied yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
            known_migrations,
        });
    }

    let (applied, latest_version): (i64, Option<i64>) =
        sqlx::query_as("SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success")
            .fetch_one(pool)
            .await?;

    Ok(MigrationStatus {
        applied_migrations: usize::try_from(applied).unwrap_or(0),
        latest_version,
        known_migrations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_present() {
        let versions: Vec<i64> = migrator().iter().map(|m| m.version).collect();
        assert_eq!(versions.len(), 2);
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_is_up_to_date() {
        let mut status = MigrationStatus {
            applied_migrations: 1,
            latest_version: Some(20260301000001),
            known_migrations: 2,
        };
        assert!(!status.is_up_to_date());

        status.applied_migrations = 2;
        assert!(status.is_up_to_date());
    }
}
