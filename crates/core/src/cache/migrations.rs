//! Database schema migrations.
//!
//! A `_migrations` table records every applied version. Each pending
//! migration runs in its own transaction together with its bookkeeping row,
//! so a crash mid-migration leaves the schema at the previous version.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, name, SQL), in application order.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "generations", include_str!("../../migrations/001_generations.sql")),
    (2, "lifecycle", include_str!("../../migrations/002_lifecycle.sql")),
];

/// Run any pending migrations.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the migration whose SQL failed.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("{version:03}_{name}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![version, name, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, name, "applied cache store migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
