//! Cull Policy Module
//!
//! Bounds the table size by deleting expired rows and, when still above the
//! cap, a random sample of the remaining rows.

use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::Result;

// == Cull Policy ==
/// Row-count cap and how often writes trigger a cull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullPolicy {
    /// Soft cap on the number of rows
    pub max_entries: usize,
    /// 0 disables culling, N culls with probability 1/N per write
    pub cull_frequency: u32,
}

impl CullPolicy {
    pub fn new(max_entries: usize, cull_frequency: u32) -> Self {
        Self {
            max_entries,
            cull_frequency,
        }
    }

    // == Should Cull ==
    /// Rolls the dice for one write.
    pub fn should_cull<R: Rng>(&self, rng: &mut R) -> bool {
        match self.cull_frequency {
            0 => false,
            n => rng.gen_ratio(1, n),
        }
    }

    /// Number of rows to drop so that `count` is back at the cap.
    pub fn excess(&self, count: usize) -> usize {
        count.saturating_sub(self.max_entries)
    }

    // == Cull ==
    /// Deletes expired rows, then a random sample of live rows if the table is
    /// still over the cap. Returns the number of rows removed.
    pub fn cull(&self, conn: &Connection, table: &str, now: DateTime<Utc>) -> Result<usize> {
        let expired = conn.execute(
            &format!("DELETE FROM {} WHERE CAST(expires AS INTEGER) <= ?1", table),
            params![now.timestamp_millis()],
        )?;

        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;

        let excess = self.excess(usize::try_from(count).unwrap_or(0));
        let evicted = if excess > 0 {
            conn.execute(
                &format!(
                    "DELETE FROM {table} WHERE cache_key IN \
                     (SELECT cache_key FROM {table} ORDER BY random() LIMIT ?1)",
                    table = table
                ),
                params![excess as i64],
            )?
        } else {
            0
        };

        if expired + evicted > 0 {
            info!(table, expired, evicted, "Culled cache table");
        } else {
            debug!(table, "Cull found nothing to remove");
        }
        Ok(expired + evicted)
    }
}

impl Default for CullPolicy {
    fn default() -> Self {
        Self::new(300, 3)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn table_with_rows(live: usize, expired: usize, now: DateTime<Utc>) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE cache (cache_key VARCHAR(250) PRIMARY KEY NOT NULL, \
             value BLOB NOT NULL, expires BIGINT NOT NULL)",
        )
        .unwrap();
        let now_ms = now.timestamp_millis();
        for i in 0..live {
            conn.execute(
                "INSERT INTO cache VALUES (?1, x'6931', ?2)",
                params![format!("live{}", i), now_ms + 60_000],
            )
            .unwrap();
        }
        for i in 0..expired {
            conn.execute(
                "INSERT INTO cache VALUES (?1, x'6931', ?2)",
                params![format!("dead{}", i), now_ms - 60_000],
            )
            .unwrap();
        }
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_zero_frequency_never_culls() {
        let policy = CullPolicy::new(10, 0);
        let mut rng = rand::thread_rng();
        assert!((0..100).all(|_| !policy.should_cull(&mut rng)));
    }

    #[test]
    fn test_frequency_one_always_culls() {
        let policy = CullPolicy::new(10, 1);
        let mut rng = StepRng::new(0, 1);
        assert!((0..100).all(|_| policy.should_cull(&mut rng)));
    }

    #[test]
    fn test_excess() {
        let policy = CullPolicy::new(30, 1);
        assert_eq!(policy.excess(40), 10);
        assert_eq!(policy.excess(30), 0);
        assert_eq!(policy.excess(5), 0);
    }

    #[test]
    fn test_cull_removes_expired_first() {
        let now = Utc::now();
        let conn = table_with_rows(5, 4, now);
        let removed = CullPolicy::new(10, 1).cull(&conn, "cache", now).unwrap();
        assert_eq!(removed, 4);
        assert_eq!(count(&conn), 5);
    }

    #[test]
    fn test_cull_samples_down_to_cap() {
        let now = Utc::now();
        let conn = table_with_rows(40, 0, now);
        let removed = CullPolicy::new(30, 1).cull(&conn, "cache", now).unwrap();
        assert_eq!(removed, 10);
        assert_eq!(count(&conn), 30);
    }
}
