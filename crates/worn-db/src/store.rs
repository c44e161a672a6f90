//! The storage collaborator.
//!
//! Persists two shapes, mirroring what the tracker needs and nothing
//! more: ordered streams of `(timestamp-id, fields)` records and flat
//! string hashes. Streams are keyed by name (`logs`, `logs-<version>`,
//! `versions`) and ordered by `(millis, serial)`; hashes hold the project
//! directory and the ticket cache.
//!
//! # Schema
//!
//! Timestamps are stored as epoch-millisecond integers so that integer
//! ordering matches chronological ordering. Record fields are a flat
//! string-to-string map serialized as JSON.
//!
//! The connection wraps `rusqlite::Connection`, which is `Send` but not
//! `Sync`; wrap a [`Store`] in a mutex for shared access.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, params};
use thiserror::Error;

use worn_core::{IdSpec, TimestampId};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stream record's field payload failed to decode.
    #[error("malformed payload for record {id} in {key:?}")]
    Payload {
        key: String,
        id: TimestampId,
        #[source]
        source: serde_json::Error,
    },

    /// A rename source key with no records.
    #[error("no such stream key {key:?}")]
    KeyMissing { key: String },
}

/// A stream record's field map.
pub type Fields = BTreeMap<String, String>;

/// Storage handle.
///
/// See the [module documentation](self) for schema and threading notes.
pub struct Store {
    conn: Connection,
}

fn serial_to_db(serial: u64) -> i64 {
    i64::try_from(serial).unwrap_or(i64::MAX)
}

impl Store {
    /// Opens a store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Opens an in-memory store; useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Initializes the schema. Idempotent.
    fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS streams (
                key TEXT NOT NULL,
                millis INTEGER NOT NULL,
                serial INTEGER NOT NULL,
                fields TEXT NOT NULL,
                PRIMARY KEY (key, millis, serial)
            );

            CREATE TABLE IF NOT EXISTS hashes (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );
            ",
        )?;
        Ok(())
    }

    // ========== Stream primitives ==========

    /// Appends one record, returning the id it was committed under.
    ///
    /// `IdSpec::Auto` assigns the next free serial within the millisecond
    /// bucket; `IdSpec::Exact` recreates a prior id exactly (used by the
    /// history replay). Assignment and insert happen in one transaction.
    pub fn append(
        &mut self,
        key: &str,
        fields: &Fields,
        id: IdSpec,
    ) -> Result<TimestampId, StoreError> {
        let payload = serde_json::to_string(fields).map_err(|source| StoreError::Payload {
            key: key.to_string(),
            id: TimestampId {
                millis: id.millis(),
                serial: 0,
            },
            source,
        })?;

        let tx = self.conn.transaction()?;
        let assigned = match id {
            IdSpec::Exact(id) => id,
            IdSpec::Auto(millis) => {
                let next: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(serial) + 1, 0) FROM streams WHERE key = ?1 AND millis = ?2",
                    params![key, millis],
                    |row| row.get(0),
                )?;
                TimestampId {
                    millis,
                    serial: next.unsigned_abs(),
                }
            }
        };
        tx.execute(
            "INSERT INTO streams (key, millis, serial, fields) VALUES (?1, ?2, ?3, ?4)",
            params![key, assigned.millis, serial_to_db(assigned.serial), payload],
        )?;
        tx.commit()?;
        Ok(assigned)
    }

    /// Inclusive range scan over a stream, optionally reversed and capped.
    pub fn range(
        &self,
        key: &str,
        start: Option<TimestampId>,
        end: Option<TimestampId>,
        count: Option<usize>,
        reverse: bool,
    ) -> Result<Vec<(TimestampId, Fields)>, StoreError> {
        let start = start.unwrap_or(TimestampId {
            millis: 0,
            serial: 0,
        });
        let end = end.unwrap_or(TimestampId {
            millis: i64::MAX,
            serial: u64::MAX,
        });
        let order = if reverse { "DESC" } else { "ASC" };
        let sql = format!(
            "
            SELECT millis, serial, fields FROM streams
            WHERE key = ?1
              AND (millis, serial) >= (?2, ?3)
              AND (millis, serial) <= (?4, ?5)
            ORDER BY millis {order}, serial {order}
            LIMIT ?6
            "
        );
        let limit = count.map_or(-1, |c| i64::try_from(c).unwrap_or(i64::MAX));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                key,
                start.millis,
                serial_to_db(start.serial),
                end.millis,
                serial_to_db(end.serial),
                limit
            ],
            |row| {
                let millis: i64 = row.get(0)?;
                let serial: i64 = row.get(1)?;
                let fields: String = row.get(2)?;
                Ok((millis, serial, fields))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (millis, serial, payload) = row?;
            let id = TimestampId {
                millis,
                serial: serial.unsigned_abs(),
            };
            let fields =
                serde_json::from_str(&payload).map_err(|source| StoreError::Payload {
                    key: key.to_string(),
                    id,
                    source,
                })?;
            records.push((id, fields));
        }
        Ok(records)
    }

    /// The tail record of a stream, if any.
    pub fn last(&self, key: &str) -> Result<Option<(TimestampId, Fields)>, StoreError> {
        Ok(self.range(key, None, None, Some(1), true)?.into_iter().next())
    }

    /// Removes one record. Returns whether anything was deleted.
    pub fn delete(&mut self, key: &str, id: TimestampId) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM streams WHERE key = ?1 AND millis = ?2 AND serial = ?3",
            params![key, id.millis, serial_to_db(id.serial)],
        )?;
        Ok(n > 0)
    }

    /// Removes every record of a stream. Returns how many were deleted;
    /// a missing key is not an error.
    pub fn delete_key(&mut self, key: &str) -> Result<usize, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM streams WHERE key = ?1", params![key])?;
        Ok(n)
    }

    /// Atomically moves every record of `old` under `new`.
    ///
    /// Fails with [`StoreError::KeyMissing`] when `old` has no records, in
    /// which case nothing changes.
    pub fn rename_key(&mut self, old: &str, new: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let n = tx.execute(
            "UPDATE streams SET key = ?2 WHERE key = ?1",
            params![old, new],
        )?;
        if n == 0 {
            return Err(StoreError::KeyMissing {
                key: old.to_string(),
            });
        }
        tx.commit()?;
        Ok(())
    }

    /// Whether a stream has at least one record.
    pub fn stream_exists(&self, key: &str) -> Result<bool, StoreError> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM streams WHERE key = ?1)",
            params![key],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ========== Hash primitives ==========

    /// Sets a hash field, overwriting any existing value.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO hashes (key, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (key, field) DO UPDATE SET value = excluded.value",
            params![key, field, value],
        )?;
        Ok(())
    }

    /// Sets a hash field only when absent. Returns whether it was set.
    pub fn hset_nx(&mut self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO hashes (key, field, value) VALUES (?1, ?2, ?3)",
            params![key, field, value],
        )?;
        Ok(n > 0)
    }

    /// Reads one hash field.
    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        use rusqlite::OptionalExtension;
        let value = self
            .conn
            .query_row(
                "SELECT value FROM hashes WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Removes one hash field. Returns whether anything was deleted.
    pub fn hdel(&mut self, key: &str, field: &str) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM hashes WHERE key = ?1 AND field = ?2",
            params![key, field],
        )?;
        Ok(n > 0)
    }

    /// All field names of a hash.
    pub fn hkeys(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field FROM hashes WHERE key = ?1 ORDER BY field")?;
        let rows = stmt.query_map(params![key], |row| row.get(0))?;
        let mut fields = Vec::new();
        for row in rows {
            fields.push(row?);
        }
        Ok(fields)
    }

    /// The whole hash as a map.
    pub fn hgetall(&self, key: &str) -> Result<Fields, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM hashes WHERE key = ?1")?;
        let rows = stmt.query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut map = Fields::new();
        for row in rows {
            let (field, value) = row?;
            map.insert(field, value);
        }
        Ok(map)
    }
}
