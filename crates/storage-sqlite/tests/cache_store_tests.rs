//! SqliteCacheStore against a temporary database.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal_macros::dec;
use shelfmark_core::cache::{CacheStore, SeriesWrite};
use shelfmark_core::catalog::{SeriesKey, VolumeRecord};
use shelfmark_metadata::Field;
use shelfmark_storage_sqlite::SqliteCacheStore;
use tempfile::TempDir;

fn open() -> (TempDir, SqliteCacheStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteCacheStore::open(dir.path()).unwrap();
    (dir, store)
}

fn record(series: &str, volume: u32) -> VolumeRecord {
    VolumeRecord::new(SeriesKey::normalize(series), volume)
}

#[tokio::test]
async fn test_write_then_read_back() {
    let (_dir, store) = open();
    let key = SeriesKey::normalize("Spy x Family");

    let mut first = record("Spy x Family", 1);
    first.fields.title = Some("Spy x Family, Vol. 1".into());
    first.fields.msrp = Some(dec!(9.99));
    let second = record("Spy x Family", 2);

    let stored = store
        .write_series(SeriesWrite::new(key.clone(), "Spy x Family", vec![first, second]))
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);

    let entry = store.lookup_exact(&key).unwrap().unwrap();
    assert_eq!(entry.display_name, "Spy x Family");
    assert_eq!(entry.volumes.len(), 2);
    assert_eq!(entry.volume(1).unwrap().fields.msrp, Some(dec!(9.99)));
    assert!(entry.last_attempted.is_some());

    let hits = store
        .batch_get(&key, &BTreeSet::from([1, 2, 3]))
        .unwrap();
    assert_eq!(hits.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn test_upsert_never_overwrites_with_null() {
    let (_dir, store) = open();

    let mut titled = record("Dandadan", 1);
    titled.fields.title = Some("Dandadan, Vol. 1".into());
    store.upsert(titled).await.unwrap();

    let mut isbn_only = record("Dandadan", 1);
    isbn_only.fields.isbn = Some("9781974741045".into());
    let merged = store.upsert(isbn_only).await.unwrap();

    assert_eq!(merged.fields.title.as_deref(), Some("Dandadan, Vol. 1"));
    assert_eq!(merged.fields.isbn.as_deref(), Some("9781974741045"));
    assert_eq!(merged.fields.present(), vec![Field::Title, Field::Isbn]);
}

#[tokio::test]
async fn test_later_write_keeps_other_volumes() {
    let (_dir, store) = open();
    let key = SeriesKey::normalize("Kaiju No. 8");

    let mut first = record("Kaiju No. 8", 1);
    first.fields.title = Some("Kaiju No. 8, Vol. 1".into());
    store
        .write_series(SeriesWrite::new(key.clone(), "Kaiju No. 8", vec![first]))
        .await
        .unwrap();

    let mut second = record("Kaiju No. 8", 2);
    second.fields.title = Some("Kaiju No. 8, Vol. 2".into());
    store
        .write_series(SeriesWrite::new(key.clone(), "Kaiju No. 8", vec![second]))
        .await
        .unwrap();

    let entry = store.lookup_exact(&key).unwrap().unwrap();
    assert_eq!(entry.volumes.len(), 2);
    assert_eq!(
        entry.volume(1).unwrap().fields.title.as_deref(),
        Some("Kaiju No. 8, Vol. 1")
    );
    assert_eq!(
        entry.volume(2).unwrap().fields.title.as_deref(),
        Some("Kaiju No. 8, Vol. 2")
    );
}

#[tokio::test]
async fn test_concurrent_writes_to_one_series_both_land() {
    let (_dir, store) = open();
    let store = Arc::new(store);
    let key = SeriesKey::normalize("Frieren");

    let mut with_title = record("Frieren", 1);
    with_title.fields.title = Some("Frieren, Vol. 1".into());
    let mut with_publisher = record("Frieren", 1);
    with_publisher.fields.publisher = Some("VIZ Media".into());

    let a = {
        let store = Arc::clone(&store);
        let write = SeriesWrite::new(key.clone(), "Frieren", vec![with_title]);
        tokio::spawn(async move { store.write_series(write).await })
    };
    let b = {
        let store = Arc::clone(&store);
        let write = SeriesWrite::new(key.clone(), "Frieren", vec![with_publisher]);
        tokio::spawn(async move { store.write_series(write).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let entry = store.lookup_exact(&key).unwrap().unwrap();
    let volume = entry.volume(1).unwrap();
    assert_eq!(volume.fields.title.as_deref(), Some("Frieren, Vol. 1"));
    assert_eq!(volume.fields.publisher.as_deref(), Some("VIZ Media"));
}

#[tokio::test]
async fn test_fuzzy_and_summaries() {
    let (_dir, store) = open();
    for (name, title) in [("Vigilantes", Some("Vigilantes 1")), ("My Hero Academia: Vigilantes", None)] {
        let key = SeriesKey::normalize(name);
        let mut rec = VolumeRecord::new(key.clone(), 1);
        rec.fields.title = title.map(String::from);
        store
            .write_series(SeriesWrite::new(key, name, vec![rec]))
            .await
            .unwrap();
    }

    let matches = store.lookup_fuzzy("vigilantes").unwrap();
    assert_eq!(matches.len(), 2);
    assert!(matches[0].exact);
    assert_eq!(matches[0].display_name, "Vigilantes");

    let summaries = store.entry_summaries().unwrap();
    assert_eq!(summaries.len(), 2);
    let titled = summaries
        .iter()
        .find(|s| s.display_name == "Vigilantes")
        .unwrap();
    assert_eq!(titled.volume_count, 1);
    assert!((titled.completeness - 1.0 / 7.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let dir = TempDir::new().unwrap();
    let key = SeriesKey::normalize("Berserk");
    {
        let store = SqliteCacheStore::open(dir.path()).unwrap();
        let mut rec = VolumeRecord::new(key.clone(), 41);
        rec.fields.title = Some("Berserk, Vol. 41".into());
        rec.unavailable.insert(Field::Msrp);
        store.upsert(rec).await.unwrap();
    }

    let store = SqliteCacheStore::open(dir.path()).unwrap();
    let entry = store.lookup_exact(&key).unwrap().unwrap();
    let volume = entry.volume(41).unwrap();
    assert_eq!(volume.fields.title.as_deref(), Some("Berserk, Vol. 41"));
    assert!(volume.unavailable.contains(&Field::Msrp));
}
