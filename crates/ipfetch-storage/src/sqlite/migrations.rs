//! Database schema migrations.
//!
//! Applied versions are tracked in a `_migrations` table; every migration is
//! idempotent so re-running against an existing file is harmless.

use tokio_rusqlite::{Connection, params, rusqlite};

/// Migration list: (version, SQL), applied in order.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_responses.sql"))];

/// Run any pending migrations.
pub(super) async fn run(conn: &Connection) -> Result<(), tokio_rusqlite::Error<rusqlite::Error>> {
    conn.call(|conn| -> Result<(), rusqlite::Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )?;
                tracing::debug!(target: "ipfetch", version, "applied cache schema migration");
            }
        }

        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let (tables, applied): (bool, i64) = conn
            .call(|conn| {
                let tables = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='responses')",
                    [],
                    |row| row.get(0),
                )?;
                let applied = conn.query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))?;
                Ok::<_, rusqlite::Error>((tables, applied))
            })
            .await
            .unwrap();

        assert!(tables);
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }
}
