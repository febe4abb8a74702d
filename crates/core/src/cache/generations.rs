//! Generation CRUD operations.
//!
//! A generation is a named bucket `<namespace>-<version>-<category>`. External
//! tooling relies on that naming to spot stale buckets, so names are always
//! derived from the three parts, never stored free-form.

use super::connection::CacheDb;
use crate::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_rusqlite::{params, rusqlite};

/// Content category of a generation. Exactly one generation per category is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Precached application shell and content-hashed assets.
    Static,
    /// Pages and resources written on the fly by handlers.
    Runtime,
    /// Images, bounded by count and age.
    Image,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Static, Category::Runtime, Category::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Static => "static",
            Category::Runtime => "runtime",
            Category::Image => "image",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Category::Static),
            "runtime" => Ok(Category::Runtime),
            "image" => Ok(Category::Image),
            other => Err(Error::InvalidInput(format!("unknown category: {other}"))),
        }
    }
}

/// Size and age limits attached to a generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationPolicy {
    /// Entry cap; `None` means unbounded.
    pub max_entries: Option<usize>,
    /// Age after which lookups treat an entry as a miss. Image category only.
    pub ttl: Option<Duration>,
}

impl GenerationPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn capped(max_entries: usize) -> Self {
        Self { max_entries: Some(max_entries), ttl: None }
    }

    pub fn expiring(max_entries: usize, ttl: Duration) -> Self {
        Self { max_entries: Some(max_entries), ttl: Some(ttl) }
    }
}

/// A versioned, category-scoped bucket of cache entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub namespace: String,
    pub version: String,
    pub category: Category,
    pub policy: GenerationPolicy,
}

impl Generation {
    pub fn new(namespace: &str, version: &str, category: Category, policy: GenerationPolicy) -> Self {
        Self { namespace: namespace.to_string(), version: version.to_string(), category, policy }
    }

    /// Persisted name, `<namespace>-<version>-<category>`.
    pub fn name(&self) -> String {
        generation_name(&self.namespace, &self.version, self.category)
    }
}

/// Build a generation name from its parts.
pub fn generation_name(namespace: &str, version: &str, category: Category) -> String {
    format!("{namespace}-{version}-{category}")
}

/// Insert the generation row, or refresh its policy if it already exists.
///
/// Shared by the standalone create and by entry writes that open a
/// generation on demand.
pub(crate) fn upsert_generation_row(conn: &rusqlite::Connection, generation: &Generation) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO generations (name, namespace, version, category, max_entries, ttl_secs, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(name) DO UPDATE SET
            max_entries = excluded.max_entries,
            ttl_secs = excluded.ttl_secs",
        params![
            generation.name(),
            &generation.namespace,
            &generation.version,
            generation.category.as_str(),
            generation.policy.max_entries.map(|n| n as i64),
            generation.policy.ttl.map(|d| d.as_secs() as i64),
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

type GenerationRow = (String, String, String, Option<i64>, Option<i64>);

fn read_generation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_generation((namespace, version, category, max_entries, ttl_secs): GenerationRow) -> Result<Generation, Error> {
    Ok(Generation {
        namespace,
        version,
        category: category.parse()?,
        policy: GenerationPolicy {
            max_entries: max_entries.map(|n| n as usize),
            ttl: ttl_secs.map(|s| Duration::from_secs(s as u64)),
        },
    })
}

impl CacheDb {
    /// Create an empty generation with its policy attached.
    ///
    /// Re-creating an existing generation keeps its entries and refreshes the policy.
    pub async fn create_generation(&self, generation: &Generation) -> Result<(), Error> {
        let generation = generation.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                upsert_generation_row(conn, &generation)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a generation by name.
    pub async fn get_generation(&self, name: &str) -> Result<Option<Generation>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Generation>, Error> {
                let result = conn.query_row(
                    "SELECT namespace, version, category, max_entries, ttl_secs FROM generations WHERE name = ?1",
                    params![name],
                    read_generation_row,
                );

                match result {
                    Ok(row) => Ok(Some(into_generation(row)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// List every generation in a namespace, oldest first.
    pub async fn list_generations(&self, namespace: &str) -> Result<Vec<Generation>, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Generation>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT namespace, version, category, max_entries, ttl_secs
                     FROM generations WHERE namespace = ?1 ORDER BY created_at ASC, name ASC",
                )?;
                let rows = stmt
                    .query_map(params![namespace], read_generation_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(into_generation).collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Returns false if no such generation existed.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation in a namespace, across all versions and categories.
    ///
    /// Returns the number of deleted generations.
    pub async fn delete_all_generations(&self, namespace: &str) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM generations WHERE namespace = ?1", params![namespace])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
