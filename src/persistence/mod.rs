//! Durable key-value persistence
//!
//! The core only needs `load(key)` / `save(key, bytes)`. [`DuckDbStore`] is the
//! on-disk implementation used by the binary; [`MemoryStore`] backs tests.

pub mod migrations;

use anyhow::{Context, Result};
use directories::BaseDirs;
use duckdb::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Key under which the contact snapshot is written
pub const SNAPSHOT_KEY: &str = "contacts.snapshot";

pub fn sync_settings_key(source_id: &str) -> String {
    format!("sync.{}.settings", source_id)
}

pub fn sync_stats_key(source_id: &str) -> String {
    format!("sync.{}.stats", source_id)
}

/// Durable byte slots addressed by string keys
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &str, value: &[u8]) -> Result<()>;
}

#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Create or open the database at the provided path and run migrations.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = expand_tilde(db_path.as_ref())?;
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).context("creating DB directory")?;
            }
        }
        let conn = Connection::open(&db_path).context("opening DuckDB")?;
        migrations::run(&conn).context("running migrations")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .expect("database connection mutex poisoned")
    }

    /// Merge the WAL into the main file
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch("CHECKPOINT;")
            .context("checkpointing database")
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get(0)?);
        }
        Ok(out)
    }
}

impl KeyValueStore for DuckDbStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?")?;
        let mut rows = stmt
            .query(params![key])
            .with_context(|| format!("loading key {}", key))?;
        let value: Option<Vec<u8>> = match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };
        Ok(value)
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn();
        // DuckDB rejects ON CONFLICT updates of defaulted columns; delete then insert instead.
        conn.execute_batch("BEGIN TRANSACTION;")?;
        let written = (|| -> Result<()> {
            let mut del = conn.prepare("DELETE FROM kv_store WHERE key = ?")?;
            del.execute(params![key])?;
            let mut ins = conn.prepare(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
            )?;
            ins.execute(params![key, value])?;
            Ok(())
        })();
        match written {
            Ok(()) => conn
                .execute_batch("COMMIT;")
                .with_context(|| format!("committing key {}", key)),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(e.context(format!("saving key {}", key)))
            }
        }
    }
}

/// In-memory store with write counting and an injectable failure mode
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent load and save fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a slot directly, bypassing the write counter
    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        self.slots
            .lock()
            .expect("memory store mutex poisoned")
            .insert(key.to_string(), value);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("memory store is in failing mode");
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self
            .slots
            .lock()
            .expect("memory store mutex poisoned")
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check()?;
        self.slots
            .lock()
            .expect("memory store mutex poisoned")
            .insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if path_str == "~" {
        let base = BaseDirs::new().context("resolving home directory")?;
        Ok(base.home_dir().to_path_buf())
    } else if let Some(stripped) = path_str.strip_prefix("~/") {
        let base = BaseDirs::new().context("resolving home directory")?;
        Ok(base.home_dir().join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_counts_and_fails() {
        let store = MemoryStore::new();
        store.save("a", b"1").unwrap();
        assert_eq!(store.load("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.write_count(), 1);

        store.set_failing(true);
        assert!(store.save("a", b"2").is_err());
        assert!(store.load("a").is_err());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn keys_are_namespaced_per_source() {
        assert_eq!(sync_settings_key("device"), "sync.device.settings");
        assert_eq!(sync_stats_key("cloud"), "sync.cloud.stats");
    }
}
