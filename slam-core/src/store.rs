//! SQLite-backed store for framed save records.
//!
//! One row per `(slot, record_type)`:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS save_records (
//!     slot        TEXT    NOT NULL,
//!     record_type INTEGER NOT NULL,
//!     version     INTEGER NOT NULL,
//!     data        BLOB    NOT NULL,
//!     updated_at  TEXT    NOT NULL,
//!     checksum    TEXT,
//!     PRIMARY KEY (slot, record_type)
//! );
//! ```
//!
//! The store only moves bytes. Decoding and its validation live in
//! [`crate::codec`]; a checksum mismatch is reported but does not stop a
//! load.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::codec::SaveRecord;
use crate::config::PersistenceConfig;
use crate::error::{Result, SlamError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS save_records (
    slot        TEXT    NOT NULL,
    record_type INTEGER NOT NULL,
    version     INTEGER NOT NULL,
    data        BLOB    NOT NULL,
    updated_at  TEXT    NOT NULL,
    checksum    TEXT,
    PRIMARY KEY (slot, record_type)
);";

const MEMORY_PATH: &str = ":memory:";

// ---------------------------------------------------------------------------
// CRC-32
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32(data))
}

fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = u32::MAX;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SaveStore
// ---------------------------------------------------------------------------

/// Handle to an open save database.
///
/// ```no_run
/// # use slam_core::store::SaveStore;
/// # use slam_core::config::PersistenceConfig;
/// # use slam_core::codec::{SaveRecord, RECORD_TYPE, RECORD_VERSION};
/// let store = SaveStore::open("saves.db", &PersistenceConfig::default())?;
/// let record = SaveRecord { record_type: RECORD_TYPE, version: RECORD_VERSION, data: vec![0; 8] };
/// store.save_record("quicksave", &record)?;
/// let loaded = store.load_record("quicksave", RECORD_TYPE)?;
/// # Ok::<(), slam_core::error::SlamError>(())
/// ```
pub struct SaveStore {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SaveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SaveStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns [`crate::error::SlamError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Save store opened");
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open a throwaway in-memory database.
    ///
    /// # Errors
    /// Returns [`crate::error::SlamError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(MEMORY_PATH),
        })
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Insert or replace `record` under `slot`.
    ///
    /// # Errors
    /// Returns [`crate::error::SlamError::Database`] on SQLite failures.
    pub fn save_record(&self, slot: &str, record: &SaveRecord) -> Result<()> {
        let start = Instant::now();
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&record.data));
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO save_records (slot, record_type, version, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(slot, record_type) DO UPDATE SET
                version = excluded.version,
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![slot, record.record_type, record.version, record.data, now, checksum],
        )?;

        debug!(
            slot,
            bytes = record.data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved record"
        );
        Ok(())
    }

    /// Fetch the record of type `record_type` stored under `slot`.
    ///
    /// # Errors
    /// Returns [`crate::error::SlamError::Database`] on SQLite failures.
    pub fn load_record(&self, slot: &str, record_type: u32) -> Result<Option<SaveRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT version, data, checksum FROM save_records
             WHERE slot = ?1 AND record_type = ?2",
        )?;
        let row: Option<(u32, Vec<u8>, Option<String>)> = stmt
            .query_row(params![slot, record_type], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()?;

        let Some((version, data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(slot, %expected, %actual, "Checksum mismatch, save may be corrupted");
                }
            }
        }

        debug!(slot, version, bytes = data.len(), "Loaded record");
        Ok(Some(SaveRecord {
            record_type,
            version,
            data,
        }))
    }

    /// Remove every record stored under `slot`. Returns whether any existed.
    ///
    /// # Errors
    /// Returns [`crate::error::SlamError::Database`] on SQLite failures.
    pub fn delete_slot(&self, slot: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM save_records WHERE slot = ?1", params![slot])?;
        Ok(deleted > 0)
    }

    /// Names of all slots holding at least one record, most recent first.
    ///
    /// # Errors
    /// Returns [`crate::error::SlamError::Database`] on SQLite failures.
    pub fn list_slots(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT slot FROM save_records GROUP BY slot ORDER BY MAX(updated_at) DESC, slot",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let slots = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with SQLite's online-backup API and
    /// verify the copy.
    ///
    /// # Errors
    /// Returns [`SlamError::Database`] on SQLite failures and
    /// [`SlamError::Corrupted`] when the copy fails its integrity check.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let dest_path = dest_path.as_ref();
        let start = Instant::now();
        let mut dest = Connection::open(dest_path)?;
        rusqlite::backup::Backup::new(&self.conn, &mut dest)?.run_to_completion(
            256,
            std::time::Duration::from_millis(50),
            None,
        )?;
        if !passes_integrity_check(&dest)? {
            return Err(SlamError::Corrupted(format!(
                "backup at {} failed its integrity check",
                dest_path.display()
            )));
        }
        debug!(
            dest = %dest_path.display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Save store copied"
        );
        Ok(())
    }

    /// Snapshot the database as generation 1 (`<db>.bak.1`), ageing older
    /// generations and dropping any beyond `backup_count`. In-memory stores
    /// have nothing to snapshot.
    ///
    /// # Errors
    /// Returns [`SlamError::Database`], [`SlamError::Io`] or
    /// [`SlamError::Corrupted`] from the copy.
    pub fn create_rotating_backup(&self) -> Result<()> {
        if self.db_path.as_os_str() == MEMORY_PATH {
            return Ok(());
        }
        let generations: Vec<PathBuf> = (1..=self.config.backup_count)
            .map(|n| self.generation_path(n))
            .collect();
        let Some(newest) = generations.first() else {
            return Ok(());
        };

        if let Some(oldest) = generations.last().filter(|p| p.exists()) {
            std::fs::remove_file(oldest)?;
        }
        for pair in generations.windows(2).rev() {
            if pair[0].exists() {
                std::fs::rename(&pair[0], &pair[1])?;
            }
        }
        self.backup(newest)?;
        info!(generations = generations.len(), "Save store backup rotated");
        Ok(())
    }

    fn generation_path(&self, n: u32) -> PathBuf {
        let mut name = self.db_path.clone().into_os_string();
        name.push(format!(".bak.{n}"));
        PathBuf::from(name)
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Database path, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Whether SQLite reports the database as intact.
    ///
    /// # Errors
    /// Returns [`SlamError::Database`] if the pragma fails.
    pub fn integrity_check(&self) -> Result<bool> {
        passes_integrity_check(&self.conn)
    }
}

fn passes_integrity_check(conn: &Connection) -> Result<bool> {
    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        warn!(verdict = %verdict, "Integrity check failed");
    }
    Ok(verdict == "ok")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
