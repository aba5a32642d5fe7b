use contact_sync::persistence::{
    migrations, sync_settings_key, DuckDbStore, KeyValueStore, SNAPSHOT_KEY,
};
use contact_sync::store::{ContactStore, StoreOptions};
use contact_sync::types::ContactDraft;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn temp_db_path() -> std::path::PathBuf {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.duckdb");
    // Keep directory alive by leaking it for test duration to avoid drop before use
    Box::leak(Box::new(dir));
    path
}

#[test]
fn db_initializes_and_table_exists() {
    let path = temp_db_path();
    let store = DuckDbStore::new(&path).expect("init db");
    let conn = store.conn();
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM kv_store").unwrap();
    let count: i64 = stmt.query_row([], |row| row.get(0)).unwrap();
    assert_eq!(count, 0, "kv_store should start empty");
    assert_eq!(migrations::current_version(&conn).unwrap(), 1);
}

#[test]
fn save_overwrites_and_load_returns_latest() {
    let store = DuckDbStore::new(temp_db_path()).unwrap();

    assert_eq!(store.load("missing").unwrap(), None);
    store.save(SNAPSHOT_KEY, b"first").unwrap();
    store.save(SNAPSHOT_KEY, b"second").unwrap();
    store.save(&sync_settings_key("cloud"), b"{}").unwrap();

    assert_eq!(store.load(SNAPSHOT_KEY).unwrap(), Some(b"second".to_vec()));
    let mut keys = store.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec![SNAPSHOT_KEY.to_string(), "sync.cloud.settings".to_string()]);
}

#[test]
fn reopening_keeps_data_and_migrations_are_idempotent() {
    let path = temp_db_path();
    {
        let store = DuckDbStore::new(&path).unwrap();
        store.save("k", b"v").unwrap();
        store.checkpoint().unwrap();
    }
    let store = DuckDbStore::new(&path).unwrap();
    assert_eq!(store.load("k").unwrap(), Some(b"v".to_vec()));
}

#[tokio::test]
async fn contact_store_reloads_snapshot_from_duckdb() {
    let options = StoreOptions {
        debounce: Duration::from_millis(5),
        history_retention: 20,
    };

    let kv: Arc<dyn KeyValueStore> = Arc::new(DuckDbStore::new(temp_db_path()).unwrap());
    let store = ContactStore::open(Arc::clone(&kv), options.clone()).await;
    let added = store
        .add(ContactDraft::named("Jane Doe").with_phone("555-1234"))
        .unwrap();
    store.shutdown().await;

    let reopened = ContactStore::open(kv, options).await;
    let loaded = reopened.get(&added.id).expect("record persisted");
    assert_eq!(loaded.name, "Jane Doe");
    assert_eq!(loaded.phones, added.phones);
}
