use crate::clock::FixedClock;
use crate::persistence::{KeyValueStore, MemoryStore};
use crate::store::{ContactStore, StoreOptions};
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Global test utilities
///
/// Provides a process-wide mutex to serialize tests that mutate process-wide
/// state (like environment variables). Use this to avoid flaky tests when
/// `cargo test` runs tests in parallel.
pub fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// 2024-01-01T00:00:00Z, a fixed start for clock-driven tests
pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ))
}

/// Store over a fresh in-memory backend. The backend is returned so tests can
/// count writes or switch it into failing mode.
pub async fn memory_store(debounce: Duration) -> (ContactStore, MemoryStore, Arc<FixedClock>) {
    let kv = MemoryStore::new();
    let clock = test_clock();
    let store = ContactStore::open_with_clock(
        Arc::new(kv.clone()) as Arc<dyn KeyValueStore>,
        StoreOptions {
            debounce,
            ..StoreOptions::default()
        },
        clock.clone(),
    )
    .await;
    (store, kv, clock)
}
