//! Entry CRUD operations.
//!
//! Entries are immutable once written. A write to an existing key replaces the
//! row wholesale: the old row is deleted and a new one inserted in the same
//! transaction, so the key moves to the newest insertion position and carries
//! a fresh `stored_at`.

use super::connection::CacheDb;
use super::generations::{Generation, upsert_generation_row};
use super::key::CacheKey;
use crate::Error;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio_rusqlite::{params, rusqlite};

/// A stored response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry relative to `now`. Entries stamped in the future have zero age.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.stored_at).to_std().unwrap_or_default()
    }
}

fn insert_entry(conn: &rusqlite::Connection, generation: &str, entry: &CacheEntry) -> Result<(), Error> {
    let key_hash = entry.key.hash();
    let headers_json = serde_json::to_string(&entry.headers)?;
    conn.execute(
        "DELETE FROM entries WHERE generation = ?1 AND key_hash = ?2",
        params![generation, &key_hash],
    )?;
    conn.execute(
        "INSERT INTO entries (generation, key_hash, method, url, status_code, headers_json, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            generation,
            &key_hash,
            entry.key.method(),
            entry.key.url().as_str(),
            entry.status as i64,
            &headers_json,
            &entry.body[..],
            entry.stored_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

type EntryRow = (String, String, i64, String, Vec<u8>, i64);

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn into_entry((method, url, status, headers_json, body, stored_at): EntryRow) -> Result<CacheEntry, Error> {
    let stored_at = DateTime::from_timestamp_millis(stored_at)
        .ok_or_else(|| Error::InvalidInput(format!("stored_at out of range: {stored_at}")))?;
    Ok(CacheEntry {
        key: CacheKey::new(&method, &url)?,
        status: status as u16,
        headers: serde_json::from_str(&headers_json)?,
        body: Bytes::from(body),
        stored_at,
    })
}

/// Fails unless `generation` belongs to the namespace's active version, or the
/// namespace has never activated one.
fn ensure_current(conn: &rusqlite::Connection, generation: &Generation) -> Result<(), Error> {
    let active = conn.query_row(
        "SELECT active_version FROM lifecycle WHERE namespace = ?1",
        params![&generation.namespace],
        |row| row.get::<_, String>(0),
    );
    match active {
        Ok(active) if active != generation.version => Err(Error::GenerationRetired(generation.name())),
        Ok(_) | Err(rusqlite::Error::QueryReturnedNoRows) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl CacheDb {
    /// Get the entry stored under `key` in the named generation.
    pub async fn get_entry(&self, generation: &str, key: &CacheKey) -> Result<Option<CacheEntry>, Error> {
        let generation = generation.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let result = conn.query_row(
                    "SELECT method, url, status_code, headers_json, body, stored_at
                     FROM entries WHERE generation = ?1 AND key_hash = ?2",
                    params![generation, key_hash],
                    read_entry_row,
                );

                match result {
                    Ok(row) => Ok(Some(into_entry(row)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Write one entry, opening its generation if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::GenerationRetired` without writing anything when the
    /// namespace has an active version and `generation` belongs to another one.
    /// A request that started before an activation may still hold the old
    /// generations; its late write must not recreate them.
    pub async fn put_entry(&self, generation: &Generation, entry: &CacheEntry) -> Result<(), Error> {
        let generation = generation.clone();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_current(&tx, &generation)?;
                upsert_generation_row(&tx, &generation)?;
                insert_entry(&tx, &generation.name(), &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Create `generations` and write every `(generation name, entry)` pair in one transaction.
    ///
    /// Either all of it lands or none of it does. Entries may only target
    /// generations in `generations` or ones that already exist.
    pub async fn put_entries_atomic(
        &self, generations: Vec<Generation>, entries: Vec<(String, CacheEntry)>,
    ) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for generation in &generations {
                    upsert_generation_row(&tx, generation)?;
                }
                for (generation, entry) in &entries {
                    insert_entry(&tx, generation, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Write a batch into one generation in a single transaction, refusing it
    /// like `put_entry` does when the generation's version is no longer active.
    pub async fn put_entries_current(&self, generation: &Generation, entries: Vec<CacheEntry>) -> Result<(), Error> {
        let generation = generation.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_current(&tx, &generation)?;
                upsert_generation_row(&tx, &generation)?;
                let name = generation.name();
                for entry in &entries {
                    insert_entry(&tx, &name, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it was absent.
    pub async fn delete_entry(&self, generation: &str, key: &CacheKey) -> Result<bool, Error> {
        let generation = generation.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE generation = ?1 AND key_hash = ?2",
                    params![generation, key_hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// List keys in insertion order, oldest first.
    pub async fn list_keys(&self, generation: &str) -> Result<Vec<CacheKey>, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CacheKey>, Error> {
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE generation = ?1 ORDER BY seq ASC")?;
                let rows = stmt
                    .query_map(params![generation], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.iter().map(|(method, url)| CacheKey::new(method, url)).collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a generation.
    pub async fn count_entries(&self, generation: &str) -> Result<usize, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE generation = ?1", params![generation], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the oldest-inserted entries until at most `max_entries` remain.
    ///
    /// Count and delete run in one call, so concurrent writers cannot push
    /// the generation past the cap between the two.
    /// Returns the number of deleted entries.
    pub async fn trim_generation(&self, generation: &str, max_entries: usize) -> Result<u64, Error> {
        let generation = generation.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE generation = ?1", params![&generation], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE seq IN (
                        SELECT seq FROM entries WHERE generation = ?1 ORDER BY seq ASC LIMIT ?2
                    )",
                    params![&generation, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Total number of entries across every generation of a namespace.
    pub async fn count_namespace_entries(&self, namespace: &str) -> Result<usize, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries e JOIN generations g ON g.name = e.generation
                     WHERE g.namespace = ?1",
                    params![namespace],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::generations::{Category, GenerationPolicy};

    fn runtime() -> Generation {
        Generation::new("bistro", "v1", Category::Runtime, GenerationPolicy::capped(3))
    }

    fn make_entry(url: &str, body: &'static str) -> CacheEntry {
        CacheEntry {
            key: CacheKey::new("GET", url).unwrap(),
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
            body: Bytes::from_static(body.as_bytes()),
            stored_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://bistro.test/news.html", "<h1>news</h1>");
        db.put_entry(&runtime(), &entry).await.unwrap();

        let stored = db.get_entry(&runtime().name(), &entry.key).await.unwrap().unwrap();
        assert_eq!(stored.body, entry.body);
        assert_eq!(stored.headers, entry.headers);
        assert_eq!(stored.stored_at.timestamp_millis(), entry.stored_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = CacheKey::new("GET", "https://bistro.test/missing").unwrap();
        assert!(db.get_entry("bistro-v1-runtime", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_and_moves_to_newest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let g = runtime();
        db.put_entry(&g, &make_entry("https://bistro.test/a", "a1")).await.unwrap();
        db.put_entry(&g, &make_entry("https://bistro.test/b", "b1")).await.unwrap();
        db.put_entry(&g, &make_entry("https://bistro.test/a", "a2")).await.unwrap();

        assert_eq!(db.count_entries(&g.name()).await.unwrap(), 2);
        let keys: Vec<String> = db
            .list_keys(&g.name())
            .await
            .unwrap()
            .iter()
            .map(|k| k.url().path().to_string())
            .collect();
        assert_eq!(keys, vec!["/b", "/a"]);

        let a = CacheKey::new("GET", "https://bistro.test/a").unwrap();
        let stored = db.get_entry(&g.name(), &a).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"a2"));
    }

    #[tokio::test]
    async fn test_put_entries_atomic_rolls_back_on_failure() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let g = runtime();
        let entries = vec![
            (g.name(), make_entry("https://bistro.test/ok", "ok")),
            ("bistro-v1-nonexistent".to_string(), make_entry("https://bistro.test/bad", "bad")),
        ];

        let result = db.put_entries_atomic(vec![g.clone()], entries).await;
        assert!(result.is_err());
        assert!(db.get_generation(&g.name()).await.unwrap().is_none());
        assert_eq!(db.count_entries(&g.name()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_entry_refuses_retired_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.activate_version("bistro", "v2").await.unwrap();

        let result = db.put_entry(&runtime(), &make_entry("https://bistro.test/late", "late")).await;

        assert!(matches!(result, Err(Error::GenerationRetired(name)) if name == "bistro-v1-runtime"));
        assert!(db.get_generation("bistro-v1-runtime").await.unwrap().is_none());

        let batch = vec![make_entry("https://bistro.test/a", "a")];
        assert!(matches!(db.put_entries_current(&runtime(), batch).await, Err(Error::GenerationRetired(_))));
        assert!(db.get_generation("bistro-v1-runtime").await.unwrap().is_none());

        let current = Generation::new("bistro", "v2", Category::Runtime, GenerationPolicy::capped(3));
        db.put_entry(&current, &make_entry("https://bistro.test/late", "late")).await.unwrap();
        assert_eq!(db.count_entries("bistro-v2-runtime").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://bistro.test/a", "a");
        db.put_entry(&runtime(), &entry).await.unwrap();

        assert!(db.delete_entry(&runtime().name(), &entry.key).await.unwrap());
        assert!(!db.delete_entry(&runtime().name(), &entry.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_trim_generation_removes_oldest_inserted() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let g = runtime();
        for path in ["1", "2", "3", "4", "5"] {
            db.put_entry(&g, &make_entry(&format!("https://bistro.test/{path}"), "x"))
                .await
                .unwrap();
        }

        assert_eq!(db.trim_generation(&g.name(), 3).await.unwrap(), 2);
        let remaining: Vec<String> = db
            .list_keys(&g.name())
            .await
            .unwrap()
            .iter()
            .map(|k| k.url().path().to_string())
            .collect();
        assert_eq!(remaining, vec!["/3", "/4", "/5"]);
        assert_eq!(db.trim_generation(&g.name(), 3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deleting_generation_cascades_to_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let g = runtime();
        db.put_entry(&g, &make_entry("https://bistro.test/a", "a")).await.unwrap();
        db.delete_generation(&g.name()).await.unwrap();

        assert_eq!(db.count_namespace_entries("bistro").await.unwrap(), 0);
        assert_eq!(db.count_entries(&g.name()).await.unwrap(), 0);
    }

    #[test]
    fn test_age_is_never_negative() {
        let mut entry = make_entry("https://bistro.test/a", "a");
        entry.stored_at = Utc::now() + chrono::Duration::seconds(30);
        assert_eq!(entry.age(Utc::now()), std::time::Duration::ZERO);
    }
}
