use chrono::Duration as ChronoDuration;
use contact_sync::clock::Clock;
use contact_sync::error::ErrorKind;
use contact_sync::persistence::{KeyValueStore, MemoryStore, SNAPSHOT_KEY};
use contact_sync::service::ContactService;
use contact_sync::store::{ContactStore, Snapshot, StoreOptions};
use contact_sync::test_utils::{memory_store, test_clock};
use contact_sync::types::{
    ContactDraft, ContactPatch, ContactRecord, EventSource, HistoryEvent, InteractionKind,
};
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(2000);

fn stored_snapshot(kv: &MemoryStore) -> Snapshot {
    let bytes = kv.load(SNAPSHOT_KEY).unwrap().expect("snapshot written");
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn burst_of_mutations_is_written_once() {
    let (store, kv, _clock) = memory_store(DEBOUNCE).await;

    for i in 0..5 {
        store.add(ContactDraft::named(format!("Contact {}", i))).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // Last mutation at t=400ms; nothing written before t=2400ms
    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert_eq!(kv.write_count(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(kv.write_count(), 1);
    assert_eq!(stored_snapshot(&kv).contacts.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn flush_writes_pending_changes_immediately() {
    let (store, kv, _clock) = memory_store(DEBOUNCE).await;

    store.add(ContactDraft::named("Jane")).unwrap();
    store.flush().await;
    assert_eq!(kv.write_count(), 1);

    // Nothing pending, nothing written
    store.flush().await;
    assert_eq!(kv.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn noop_mutations_schedule_no_write() {
    let (store, kv, _clock) = memory_store(DEBOUNCE).await;

    assert!(store.delete("missing").is_none());
    assert!(store.toggle_favorite("missing").is_none());
    assert!(store
        .update("missing", ContactPatch::default())
        .is_none());
    store.flush().await;
    assert_eq!(kv.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_write_is_swallowed_and_retried() {
    let (store, kv, _clock) = memory_store(DEBOUNCE).await;
    kv.set_failing(true);

    let added = store.add(ContactDraft::named("Jane")).unwrap();
    store.flush().await;
    assert_eq!(kv.write_count(), 0);
    // Memory stays authoritative
    assert_eq!(store.get(&added.id).unwrap().name, "Jane");

    kv.set_failing(false);
    store.flush().await;
    assert_eq!(kv.write_count(), 1);
}

#[tokio::test]
async fn corrupt_snapshot_loads_as_empty_store() {
    let kv = MemoryStore::new();
    kv.insert_raw(SNAPSHOT_KEY, b"{ not json".to_vec());

    let store = ContactStore::open(Arc::new(kv), StoreOptions::default()).await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn deleted_record_leaves_no_trace_after_reload() {
    let (store, kv, _clock) = memory_store(Duration::from_millis(10)).await;

    let jane = store.add(ContactDraft::named("Jane")).unwrap();
    store.add(ContactDraft::named("John")).unwrap();
    store.delete(&jane.id).unwrap();
    store.shutdown().await;

    let reloaded = ContactStore::open(Arc::new(kv), StoreOptions::default()).await;
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get(&jane.id).is_none());
    assert!(reloaded.find_duplicates().is_empty());
}

#[tokio::test]
async fn trimmed_history_survives_in_durable_copy() {
    let clock = test_clock();
    let now = chrono::Utc::now();
    let mut record = ContactRecord::from_draft("c1".to_string(), ContactDraft::named("Jane"), now);
    for i in 0..30 {
        record.history.push(HistoryEvent::new(
            InteractionKind::Call,
            now + ChronoDuration::minutes(i),
            EventSource::Automatic,
        ));
    }
    let kv = MemoryStore::new();
    kv.insert_raw(
        SNAPSHOT_KEY,
        serde_json::to_vec(&Snapshot {
            version: 1,
            contacts: vec![record],
        })
        .unwrap(),
    );

    let store = ContactStore::open_with_clock(
        Arc::new(kv.clone()),
        StoreOptions {
            debounce: Duration::from_millis(10),
            history_retention: 20,
        },
        clock,
    )
    .await;
    let in_memory = store.get("c1").unwrap();
    assert_eq!(in_memory.history.len(), 20);
    // The newest events are the ones kept
    assert_eq!(
        in_memory.history.last().unwrap().timestamp,
        now + ChronoDuration::minutes(29)
    );

    store.toggle_favorite("c1").unwrap();
    store.flush().await;
    let durable = &stored_snapshot(&kv).contacts[0];
    assert_eq!(durable.history.len(), 30);
    assert!(durable.favorite);
}

fn with_notes(id: &str, name: &str, prefix: &str) -> ContactRecord {
    let now = chrono::Utc::now();
    let mut record = ContactRecord::from_draft(id.to_string(), ContactDraft::named(name), now);
    for i in 0..3 {
        record.history.push(
            HistoryEvent::new(
                InteractionKind::Call,
                now + ChronoDuration::minutes(i),
                EventSource::Manual,
            )
            .with_note(format!("{}{}", prefix, i)),
        );
    }
    record
}

#[tokio::test]
async fn merge_keeps_durable_history_in_order() {
    let kv = MemoryStore::new();
    kv.insert_raw(
        SNAPSHOT_KEY,
        serde_json::to_vec(&Snapshot {
            version: 1,
            contacts: vec![with_notes("a", "Ann", "A"), with_notes("b", "Bee", "B")],
        })
        .unwrap(),
    );
    let store = ContactStore::open_with_clock(
        Arc::new(kv.clone()),
        StoreOptions {
            debounce: Duration::from_millis(10),
            history_retention: 1,
        },
        test_clock(),
    )
    .await;

    let (merged, _) = store.merge_into("a", "b").unwrap();
    store.flush().await;

    let durable = &stored_snapshot(&kv).contacts[0];
    let notes: Vec<&str> = durable
        .history
        .iter()
        .filter_map(|e| e.note.as_deref())
        .collect();
    assert_eq!(notes[..6], ["A0", "A1", "A2", "B0", "B1", "B2"]);
    assert_eq!(notes.len(), 7);
    assert!(notes[6].starts_with("Merged with Bee"));

    // In memory holds the newest events of the same sequence
    let tail: Vec<&str> = merged
        .history
        .iter()
        .filter_map(|e| e.note.as_deref())
        .collect();
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[..], notes[4..]);
}

#[tokio::test]
async fn duplicate_pair_is_detected_and_merged() {
    let (store, _kv, _clock) = memory_store(DEBOUNCE).await;

    let jane = store
        .add(
            ContactDraft::named("Jane Doe")
                .with_phone("555-1234")
                .with_email("jane@x.com"),
        )
        .unwrap();
    let j = store
        .add(
            ContactDraft::named("J. Doe")
                .with_phone("(555) 1234")
                .with_email("JANE@X.COM"),
        )
        .unwrap();
    store.add(ContactDraft::named("Bob Smith").with_phone("999-0000")).unwrap();

    let candidates = store.find_duplicates();
    assert_eq!(candidates.len(), 1);
    let pair = &candidates[0];
    assert!(pair.similarity >= 60);
    assert!(pair.reasons.contains(&"Matching phone numbers".to_string()));
    assert!(pair.reasons.contains(&"Matching email addresses".to_string()));

    let (merged, absorbed) = store.merge_into(&jane.id, &j.id).unwrap();
    assert_eq!(absorbed.id, j.id);
    assert_eq!(merged.id, jane.id);
    assert_eq!(merged.name, "Jane Doe");
    assert_eq!(merged.phones.len(), 1);
    assert_eq!(merged.emails.len(), 1);
    let last = merged.history.last().unwrap();
    assert!(last.note.as_deref().unwrap().contains("J. Doe"));

    assert_eq!(store.len(), 2);
    assert!(store.get(&j.id).is_none());
    assert!(store.find_duplicates().is_empty());
}

#[tokio::test]
async fn merge_with_missing_or_same_id_changes_nothing() {
    let (store, _kv, _clock) = memory_store(DEBOUNCE).await;
    let jane = store.add(ContactDraft::named("Jane")).unwrap();

    let err = store.merge_into(&jane.id, "missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = store.merge_into(&jane.id, &jane.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(store.snapshot(), vec![jane]);
}

#[tokio::test]
async fn views_follow_flags_groups_and_clock() {
    let (store, _kv, clock) = memory_store(DEBOUNCE).await;

    let jane = store
        .add(ContactDraft::named("Jane").with_group("Family"))
        .unwrap();
    let bob = store.add(ContactDraft::named("Bob")).unwrap();

    store.toggle_favorite(&jane.id).unwrap();
    store.toggle_vip(&bob.id).unwrap();
    assert_eq!(store.favorites().len(), 1);
    assert_eq!(store.vips()[0].id, bob.id);

    let groups = store.groups();
    assert_eq!(groups["Family"][0].id, jane.id);
    assert_eq!(groups["Other"][0].id, bob.id);

    let call = HistoryEvent::new(InteractionKind::Call, clock.now(), EventSource::Manual);
    store.append_history(&bob.id, call).unwrap();
    assert_eq!(store.recent(ChronoDuration::days(7))[0].id, bob.id);

    clock.advance(ChronoDuration::days(8));
    assert!(store.recent(ChronoDuration::days(7)).is_empty());

    // Windows past the start of representable time include everything
    assert_eq!(store.recent(ChronoDuration::MAX).len(), 1);
    let service = ContactService::new(store.clone());
    assert_eq!(service.recent(i64::MAX).len(), 1);
}

#[tokio::test]
async fn update_rederives_display_name_and_clears_fields() {
    let (store, _kv, clock) = memory_store(DEBOUNCE).await;
    let mut draft = ContactDraft::default();
    draft.first_name = Some("Jane".to_string());
    draft.organization = Some("Acme".to_string());
    let record = store.add(draft).unwrap();
    assert_eq!(record.name, "Jane");

    clock.advance(ChronoDuration::minutes(5));
    let updated = store
        .update(
            &record.id,
            ContactPatch {
                last_name: Some("Doe".to_string()),
                organization: Some(String::new()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Jane Doe");
    assert!(updated.organization.is_none());
    assert!(updated.updated_at > record.updated_at);
}
