//! KeyedStore tests through the public API.

use std::sync::Arc;

use sortview::store::KeyedStore;

#[derive(Debug, PartialEq)]
struct Reading(i64);

fn bucket_store() -> KeyedStore<i64, Reading> {
    KeyedStore::new(|r: &Reading| r.0 / 5)
}

#[test]
fn test_remove_by_key_scenario() {
    let mut store = bucket_store();
    for v in [15, 20, 25] {
        store.add(Arc::new(Reading(v))).unwrap();
    }
    let mut keys: Vec<i64> = store.keys().copied().collect();
    keys.sort();
    assert_eq!(keys, vec![3, 4, 5]);

    assert_eq!(store.remove_by_key(&3).map(|r| r.0), Some(15));
    assert_eq!(store.len(), 2);
    assert!(store.get(&3).is_none());

    assert!(store.remove_by_key(&999).is_none());
    assert_eq!(store.len(), 2);
}

#[test]
fn test_duplicate_add_leaves_store_unchanged() {
    let mut store = bucket_store();
    let first = Arc::new(Reading(10));
    store.add(Arc::clone(&first)).unwrap();

    let err = store.add(Arc::new(Reading(11))).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.module(), "store");
    assert_eq!(store.len(), 1);
    assert!(Arc::ptr_eq(store.get(&2).unwrap(), &first));

    assert!(!store.try_add(Arc::new(Reading(12))));
    assert!(store.try_add(Arc::new(Reading(30))));
}

#[test]
fn test_bulk_add_is_all_or_nothing() {
    let mut store = bucket_store();
    store.add(Arc::new(Reading(0))).unwrap();

    let batch = vec![Arc::new(Reading(5)), Arc::new(Reading(1))];
    assert!(store.add_bulk(batch).unwrap_err().is_conflict());
    assert_eq!(store.len(), 1);

    let batch = vec![Arc::new(Reading(5)), Arc::new(Reading(6))];
    assert!(store.add_bulk(batch).is_err());
    assert_eq!(store.len(), 1);

    let batch = vec![Arc::new(Reading(5)), Arc::new(Reading(10))];
    assert_eq!(store.add_bulk(batch).unwrap().len(), 2);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_indexer_reports_missing_key() {
    let store = bucket_store();
    let err = store.item(&7).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains('7'));
}
