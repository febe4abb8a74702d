//! Persisted lifecycle state.
//!
//! The active version of each namespace is written when activation finishes,
//! so a restarted agent keeps answering version queries with the version it
//! was serving before.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

impl CacheDb {
    /// Version whose generations are currently serving, if any activation has completed.
    pub async fn active_version(&self, namespace: &str) -> Result<Option<String>, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT active_version FROM lifecycle WHERE namespace = ?1",
                    params![namespace],
                    |row| row.get(0),
                );

                match result {
                    Ok(version) => Ok(Some(version)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Make `version` the active version of `namespace` and delete every
    /// generation of that namespace belonging to another version.
    ///
    /// Both happen in one transaction. Entry writes check the recorded active
    /// version inside their own transaction, so once this commits no write can
    /// bring a deleted generation back. Returns the number of deleted generations.
    pub async fn activate_version(&self, namespace: &str, version: &str) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO lifecycle (namespace, active_version, activated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(namespace) DO UPDATE SET
                        active_version = excluded.active_version,
                        activated_at = excluded.activated_at",
                    params![&namespace, &version, chrono::Utc::now().to_rfc3339()],
                )?;
                let deleted = tx.execute(
                    "DELETE FROM generations WHERE namespace = ?1 AND version != ?2",
                    params![&namespace, &version],
                )?;
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
