//! Size-cap enforcement.
//!
//! Eviction is by insertion order, not access order: reads never reorder
//! entries, so a frequently served entry is still evicted once it is among
//! the oldest written. It only deletes when a write pushed the generation
//! over its cap.

use crate::Error;
use crate::cache::{CacheDb, Generation};

#[derive(Debug, Clone)]
pub struct EvictionManager {
    db: CacheDb,
}

impl EvictionManager {
    pub fn new(db: CacheDb) -> Self {
        Self { db }
    }

    /// Delete the oldest-inserted entries of `generation` beyond its `max_entries`.
    ///
    /// Unbounded generations are left alone. Returns the number of evicted entries.
    pub async fn enforce(&self, generation: &Generation) -> Result<u64, Error> {
        let Some(max_entries) = generation.policy.max_entries else {
            return Ok(0);
        };

        let evicted = self.db.trim_generation(&generation.name(), max_entries).await?;
        if evicted > 0 {
            tracing::debug!(generation = %generation.name(), evicted, max_entries, "evicted oldest entries");
        }
        Ok(evicted)
    }
}
