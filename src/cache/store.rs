//! Cache Store Module
//!
//! Main cache engine: the generic cache API expressed as SQL statements
//! against one table. Every mutation that has to be race-free (`add`,
//! `incr`/`decr`) is a single statement, so the database's row atomicity and
//! primary-key uniqueness are the only concurrency control.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::codec;
use crate::cache::storage::{attach_connection, create_table, open_connection, quote_table_name};
use crate::cache::{CacheStats, CullPolicy, Expiry, KeyCodec, KeyFunction, KeyFunctionRegistry, Timeout};
use crate::config::CacheSettings;
use crate::error::{CacheError, Result};

/// Keys bound per `IN (...)` statement, below SQLite's parameter limit.
const KEYS_PER_STATEMENT: usize = 500;

/// Rows per multi-row upsert (three parameters each).
const ROWS_PER_STATEMENT: usize = 300;

// == Database Cache ==
/// A cache backed by a single SQL table.
///
/// Each instance owns one connection. Threads and processes sharing a cache
/// open their own instance over the same database file.
pub struct DatabaseCache {
    /// Connection to the database holding the table
    conn: Connection,
    /// Quoted table name
    table: String,
    /// Physical key construction
    keys: KeyCodec,
    /// Timeout used for `Timeout::Default`
    default_timeout: Timeout,
    /// Culling configuration
    cull: CullPolicy,
}

impl DatabaseCache {
    // == Constructors ==
    /// Creates a cache over `conn`, creating the table if needed.
    ///
    /// Fails with [`CacheError::InvalidConfig`] when the settings name a key
    /// function; use [`DatabaseCache::with_registry`] for those.
    pub fn new(conn: Connection, settings: &CacheSettings) -> Result<Self> {
        Self::with_registry(conn, settings, &KeyFunctionRegistry::new())
    }

    /// Creates a cache over `conn`, resolving `KEY_FUNCTION` in `registry`.
    pub fn with_registry(
        conn: Connection,
        settings: &CacheSettings,
        registry: &KeyFunctionRegistry,
    ) -> Result<Self> {
        let cache = Self::without_bootstrap(conn, settings, registry)?;
        create_table(&cache.conn, &cache.table)?;
        debug!(table = %cache.table, keys = ?cache.keys, "Cache table ready");
        Ok(cache)
    }

    fn without_bootstrap(
        conn: Connection,
        settings: &CacheSettings,
        registry: &KeyFunctionRegistry,
    ) -> Result<Self> {
        let mut keys = KeyCodec::new(settings.key_prefix.clone(), settings.version);
        if let Some(name) = &settings.key_function {
            keys = keys.with_function(registry.resolve(name)?);
        }

        Ok(Self {
            conn,
            table: quote_table_name(&settings.location),
            keys,
            default_timeout: settings.default_timeout(),
            cull: settings.cull_policy(),
        })
    }

    /// Opens the database file at `path` and creates a cache over it.
    pub fn open(path: impl AsRef<Path>, settings: &CacheSettings) -> Result<Self> {
        Self::open_with_registry(path, settings, &KeyFunctionRegistry::new())
    }

    /// Like [`DatabaseCache::open`], resolving `KEY_FUNCTION` in `registry`.
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        settings: &CacheSettings,
        registry: &KeyFunctionRegistry,
    ) -> Result<Self> {
        Self::with_registry(open_connection(path)?, settings, registry)
    }

    /// Opens a cache over a table an earlier `open` already created.
    ///
    /// Skips the journal mode and `CREATE TABLE` statements; operations fail
    /// with [`CacheError::Storage`] if the table is missing.
    pub fn attach_with_registry(
        path: impl AsRef<Path>,
        settings: &CacheSettings,
        registry: &KeyFunctionRegistry,
    ) -> Result<Self> {
        Self::without_bootstrap(attach_connection(path)?, settings, registry)
    }

    /// A private in-memory cache, mostly useful for tests.
    pub fn open_in_memory(settings: &CacheSettings) -> Result<Self> {
        Self::new(Connection::open_in_memory()?, settings)
    }

    /// Replaces the key scheme with `function`.
    pub fn with_key_function(mut self, function: KeyFunction) -> Self {
        self.keys = self.keys.with_function(function);
        self
    }

    /// The quoted table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Physical key for `key` at `version` (the default version when `None`).
    pub fn make_key(&self, key: &str, version: Option<i64>) -> Result<String> {
        self.keys.make_key(key, version)
    }

    // == Get ==
    /// Returns the live value stored under `key`, or `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, version: Option<i64>) -> Result<Option<T>> {
        let physical = self.make_key(key, version)?;
        let blob: Option<Vec<u8>> = self
            .conn
            .prepare_cached(&format!(
                "SELECT value FROM {} WHERE cache_key = ?1 AND CAST(expires AS INTEGER) > ?2",
                self.table
            ))?
            .query_row(params![physical, now_millis()], |row| row.get(0))
            .optional()?;

        debug!(key = %physical, hit = blob.is_some(), "get");
        blob.map(|blob| codec::decode(&blob)).transpose()
    }

    /// Returns the live value stored under `key`, or `default`.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T, version: Option<i64>) -> Result<T> {
        Ok(self.get(key, version)?.unwrap_or(default))
    }

    // == Get Many ==
    /// Fetches several keys at once. Missing and expired keys are left out.
    pub fn get_many<T, K>(&self, keys: &[K], version: Option<i64>) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let mut logical_by_physical = HashMap::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            logical_by_physical.insert(self.make_key(key, version)?, key.to_string());
        }

        let physical_keys: Vec<&String> = logical_by_physical.keys().collect();
        let now = now_millis();
        let mut found = HashMap::new();

        for chunk in physical_keys.chunks(KEYS_PER_STATEMENT) {
            let sql = format!(
                "SELECT cache_key, value FROM {} WHERE CAST(expires AS INTEGER) > ?1 AND cache_key IN ({})",
                self.table,
                placeholders(2, chunk.len())
            );
            let bound = std::iter::once(Value::Integer(now))
                .chain(chunk.iter().map(|key| Value::Text((*key).clone())));

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bound), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            for row in rows {
                let (physical, blob) = row?;
                if let Some(logical) = logical_by_physical.get(&physical) {
                    found.insert(logical.clone(), codec::decode(&blob)?);
                }
            }
        }

        debug!(requested = keys.len(), found = found.len(), "get_many");
        Ok(found)
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any existing row.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        timeout: Timeout,
        version: Option<i64>,
    ) -> Result<()> {
        let physical = self.make_key(key, version)?;
        let blob = codec::encode(value)?;
        let expiry = self.expiry(timeout);

        self.conn
            .prepare_cached(&format!(
                "INSERT INTO {} (cache_key, value, expires) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(cache_key) DO UPDATE SET value = excluded.value, expires = excluded.expires",
                self.table
            ))?
            .execute(params![physical, blob, expiry.as_millis()])?;

        debug!(key = %physical, expires = expiry.as_millis(), "set");
        self.maybe_cull()?;
        Ok(())
    }

    // == Set Many ==
    /// Stores every entry with one upsert per batch, all inside one transaction.
    ///
    /// Returns the keys that could not be stored, which is empty on success:
    /// any failure aborts the whole call instead.
    pub fn set_many<K, V, I>(&self, entries: I, timeout: Timeout, version: Option<i64>) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let expiry = self.expiry(timeout);
        let rows = entries
            .into_iter()
            .map(|(key, value)| -> Result<(String, Vec<u8>)> {
                Ok((self.make_key(key.as_ref(), version)?, codec::encode(&value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let values = (0..chunk.len())
                .map(|i| format!("(?{}, ?{}, ?{})", 3 * i + 1, 3 * i + 2, 3 * i + 3))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {} (cache_key, value, expires) VALUES {} \
                 ON CONFLICT(cache_key) DO UPDATE SET value = excluded.value, expires = excluded.expires",
                self.table, values
            );
            let bound = chunk.iter().flat_map(|(key, blob)| {
                [
                    Value::Text(key.clone()),
                    Value::Blob(blob.clone()),
                    Value::Integer(expiry.as_millis()),
                ]
            });
            tx.execute(&sql, params_from_iter(bound))?;
        }
        tx.commit()?;

        debug!(count = rows.len(), "set_many");
        self.maybe_cull()?;
        Ok(Vec::new())
    }

    // == Add ==
    /// Stores `value` only if `key` has no live row. Returns whether it did.
    ///
    /// A single conditional upsert: a conflicting row is overwritten only when
    /// it has already expired, so concurrent callers cannot both succeed.
    pub fn add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        timeout: Timeout,
        version: Option<i64>,
    ) -> Result<bool> {
        let physical = self.make_key(key, version)?;
        let blob = codec::encode(value)?;
        let expiry = self.expiry(timeout);

        let changed = self
            .conn
            .prepare_cached(&format!(
                "INSERT INTO {table} (cache_key, value, expires) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(cache_key) DO UPDATE SET value = excluded.value, expires = excluded.expires \
                 WHERE CAST({table}.expires AS INTEGER) <= ?4",
                table = self.table
            ))?
            .execute(params![physical, blob, expiry.as_millis(), now_millis()])?;

        let added = changed == 1;
        debug!(key = %physical, added, "add");
        self.maybe_cull()?;
        Ok(added)
    }

    // == Touch ==
    /// Sets a new expiry on a live row. Returns false if there was none.
    pub fn touch(&self, key: &str, timeout: Timeout, version: Option<i64>) -> Result<bool> {
        let physical = self.make_key(key, version)?;
        let expiry = self.expiry(timeout);
        let changed = self
            .conn
            .prepare_cached(&format!(
                "UPDATE {} SET expires = ?1 WHERE cache_key = ?2 AND CAST(expires AS INTEGER) > ?3",
                self.table
            ))?
            .execute(params![expiry.as_millis(), physical, now_millis()])?;

        debug!(key = %physical, touched = changed == 1, "touch");
        Ok(changed == 1)
    }

    // == Delete ==
    /// Removes `key`. Deleting a missing key is not an error.
    pub fn delete(&self, key: &str, version: Option<i64>) -> Result<()> {
        let physical = self.make_key(key, version)?;
        self.conn
            .prepare_cached(&format!("DELETE FROM {} WHERE cache_key = ?1", self.table))?
            .execute(params![physical])?;
        debug!(key = %physical, "delete");
        Ok(())
    }

    /// Removes every key in `keys`.
    pub fn delete_many<K: AsRef<str>>(&self, keys: &[K], version: Option<i64>) -> Result<()> {
        let physical_keys = keys
            .iter()
            .map(|key| self.make_key(key.as_ref(), version))
            .collect::<Result<Vec<_>>>()?;

        let mut deleted = 0;
        for chunk in physical_keys.chunks(KEYS_PER_STATEMENT) {
            let sql = format!(
                "DELETE FROM {} WHERE cache_key IN ({})",
                self.table,
                placeholders(1, chunk.len())
            );
            deleted += self.conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        debug!(requested = keys.len(), deleted, "delete_many");
        Ok(())
    }

    // == Has Key ==
    /// Whether `key` has a live row. The value is never decoded.
    pub fn has_key(&self, key: &str, version: Option<i64>) -> Result<bool> {
        let physical = self.make_key(key, version)?;
        self.exists(&physical)
    }

    fn exists(&self, physical: &str) -> Result<bool> {
        let found = self
            .conn
            .prepare_cached(&format!(
                "SELECT 1 FROM {} WHERE cache_key = ?1 AND CAST(expires AS INTEGER) > ?2",
                self.table
            ))?
            .query_row(params![physical, now_millis()], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    // == Incr / Decr ==
    /// Adds `delta` to the integer stored under `key` and returns the result.
    ///
    /// One UPDATE does the arithmetic in the database, so concurrent
    /// increments never lose updates. Fails with [`CacheError::NotFound`] if
    /// the key is missing or expired.
    pub fn incr(&self, key: &str, delta: i64, version: Option<i64>) -> Result<i64> {
        let physical = self.make_key(key, version)?;
        let updated: Option<i64> = self
            .conn
            .prepare_cached(&format!(
                "UPDATE {} SET value = CAST('i' || (CAST(substr(value, 2) AS INTEGER) + ?1) AS BLOB) \
                 WHERE cache_key = ?2 AND CAST(expires AS INTEGER) > ?3 \
                 AND substr(value, 1, 1) = x'{:02x}' \
                 AND typeof(CAST(substr(value, 2) AS INTEGER) + ?1) = 'integer' \
                 RETURNING CAST(substr(value, 2) AS INTEGER)",
                self.table,
                codec::TAG_INTEGER
            ))?
            .query_row(params![delta, physical, now_millis()], |row| row.get(0))
            .optional()?;

        match updated {
            Some(value) => {
                debug!(key = %physical, delta, value, "incr");
                Ok(value)
            }
            None if self.exists(&physical)? => Err(CacheError::InvalidPayload(format!(
                "value of '{}' is not an integer or would overflow",
                key
            ))),
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    /// Subtracts `delta` from the integer stored under `key`.
    pub fn decr(&self, key: &str, delta: i64, version: Option<i64>) -> Result<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::InvalidRequest("delta out of range".to_string()))?;
        self.incr(key, delta, version)
    }

    // == Incr / Decr Version ==
    /// Moves `key` from `version` to `version + delta`, returning the new version.
    ///
    /// The copy and the removal of the old row share one immediate
    /// transaction. An existing row at the destination is overwritten. Fails
    /// with [`CacheError::NotFound`] if the source is missing or expired.
    pub fn incr_version(&self, key: &str, delta: i64, version: Option<i64>) -> Result<i64> {
        let version = version.unwrap_or(self.keys.version());
        let new_version = version
            .checked_add(delta)
            .ok_or_else(|| CacheError::InvalidRequest("version out of range".to_string()))?;
        let old_key = self.make_key(key, Some(version))?;

        if delta == 0 {
            return if self.exists(&old_key)? {
                Ok(version)
            } else {
                Err(CacheError::NotFound(key.to_string()))
            };
        }
        let new_key = self.make_key(key, Some(new_version))?;
        if new_key == old_key {
            // Both versions share one row, nothing to move
            return if self.exists(&old_key)? {
                Ok(new_version)
            } else {
                Err(CacheError::NotFound(key.to_string()))
            };
        }

        let tx =Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let copied = tx.execute(
            &format!(
                "INSERT INTO {table} (cache_key, value, expires) \
                 SELECT ?1, value, expires FROM {table} \
                 WHERE cache_key = ?2 AND CAST(expires AS INTEGER) > ?3 \
                 ON CONFLICT(cache_key) DO UPDATE SET value = excluded.value, expires = excluded.expires",
                table = self.table
            ),
            params![new_key, old_key, now_millis()],
        )?;
        if copied == 0 {
            // Dropping the transaction rolls it back
            return Err(CacheError::NotFound(key.to_string()));
        }
        tx.execute(
            &format!("DELETE FROM {} WHERE cache_key = ?1", self.table),
            params![old_key],
        )?;
        tx.commit()?;

        debug!(from = %old_key, to = %new_key, "incr_version");
        Ok(new_version)
    }

    /// Moves `key` from `version` to `version - delta`, returning the new version.
    pub fn decr_version(&self, key: &str, delta: i64, version: Option<i64>) -> Result<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::InvalidRequest("delta out of range".to_string()))?;
        self.incr_version(key, delta, version)
    }

    // == Prefix Queries ==
    /// Logical keys with live rows whose names start with `prefix`.
    ///
    /// Only available with the default key scheme.
    pub fn keys_with_prefix(&self, prefix: &str, version: Option<i64>) -> Result<Vec<String>> {
        let physical_prefix = self.physical_prefix(prefix, version)?;
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT cache_key FROM {} \
             WHERE substr(cache_key, 1, ?1) = ?2 AND CAST(expires AS INTEGER) > ?3 \
             ORDER BY cache_key",
            self.table
        ))?;
        let physical_keys = stmt
            .query_map(
                params![
                    physical_prefix.chars().count() as i64,
                    physical_prefix,
                    now_millis()
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(physical_keys
            .iter()
            .filter_map(|physical| self.keys.reverse_key(physical))
            .collect())
    }

    /// Deletes every row whose logical key starts with `prefix`, returning the count.
    ///
    /// Only available with the default key scheme.
    pub fn delete_with_prefix(&self, prefix: &str, version: Option<i64>) -> Result<usize> {
        let physical_prefix = self.physical_prefix(prefix, version)?;
        let deleted = self
            .conn
            .prepare_cached(&format!(
                "DELETE FROM {} WHERE substr(cache_key, 1, ?1) = ?2",
                self.table
            ))?
            .execute(params![
                physical_prefix.chars().count() as i64,
                physical_prefix
            ])?;
        debug!(prefix = %physical_prefix, deleted, "delete_with_prefix");
        Ok(deleted)
    }

    fn physical_prefix(&self, prefix: &str, version: Option<i64>) -> Result<String> {
        if self.keys.is_custom() {
            return Err(CacheError::InvalidConfig(
                "prefix queries need the default key scheme".to_string(),
            ));
        }
        self.make_key(prefix, version)
    }

    // == Clear ==
    /// Deletes every row of the table.
    pub fn clear(&self) -> Result<()> {
        let deleted = self.conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        debug!(table = %self.table, deleted, "clear");
        Ok(())
    }

    // == Cull ==
    /// Culls unconditionally, returning the number of rows removed.
    pub fn cull(&self) -> Result<usize> {
        self.cull.cull(&self.conn, &self.table, Utc::now())
    }

    /// Culls on the configured fraction of writes.
    fn maybe_cull(&self) -> Result<()> {
        if self.cull.should_cull(&mut rand::thread_rng()) {
            self.cull()?;
        }
        Ok(())
    }

    // == Stats ==
    /// Current row counts of the table.
    pub fn stats(&self) -> Result<CacheStats> {
        let (total, expired): (i64, i64) = self.conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(CAST(expires AS INTEGER) <= ?1), 0) FROM {}",
                self.table
            ),
            params![now_millis()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(CacheStats {
            total_entries: usize::try_from(total).unwrap_or(0),
            expired_entries: usize::try_from(expired).unwrap_or(0),
            max_entries: self.cull.max_entries,
        })
    }

    // == Close ==
    /// Closes the underlying connection.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| CacheError::Storage(e))
    }

    fn expiry(&self, timeout: Timeout) -> Expiry {
        Expiry::resolve(timeout, self.default_timeout, now())
    }
}

impl fmt::Debug for DatabaseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCache")
            .field("table", &self.table)
            .field("keys", &self.keys)
            .field("default_timeout", &self.default_timeout)
            .field("cull", &self.cull)
            .finish()
    }
}

// == Utility Functions ==
fn now() -> DateTime<Utc> {
    Utc::now()
}

fn now_millis() -> i64 {
    now().timestamp_millis()
}

/// `?first, ?first+1, ...` for `count` parameters.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
