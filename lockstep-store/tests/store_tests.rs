use lockstep_store::{
    DurableStateStore, MemoryStateStore, SqliteStateStore, StorageError, StoredValue, WriteBatch,
};
use tempfile::TempDir;

fn exercise_basic_ops(store: &dyn DurableStateStore) {
    assert!(store.get("missing").unwrap().is_none());

    store.set("a.text", StoredValue::from("hello")).unwrap();
    store.set("a.flag", StoredValue::from(true)).unwrap();

    assert_eq!(store.get_str("a.text").unwrap().as_deref(), Some("hello"));
    assert_eq!(store.get_bool("a.flag").unwrap(), Some(true));

    let mut batch = WriteBatch::new();
    batch.put("a.text", "world").delete("a.flag").put("b.other", false);
    store.apply(batch).unwrap();

    assert_eq!(store.get_str("a.text").unwrap().as_deref(), Some("world"));
    assert!(store.get("a.flag").unwrap().is_none());
    assert_eq!(store.get_bool("b.other").unwrap(), Some(false));
    assert_eq!(store.keys_with_prefix("a.").unwrap(), vec!["a.text".to_string()]);
}

#[test]
fn memory_store_basic_ops() {
    exercise_basic_ops(&MemoryStateStore::new());
}

#[test]
fn sqlite_store_basic_ops() {
    exercise_basic_ops(&SqliteStateStore::open_in_memory().unwrap());
}

#[test]
fn type_mismatch_is_reported() {
    let store = MemoryStateStore::new();
    store.set("flag", StoredValue::from(true)).unwrap();
    let err = store.get_str("flag").unwrap_err();
    assert!(matches!(err, StorageError::TypeMismatch { .. }));

    store.set("text", StoredValue::from("x")).unwrap();
    assert!(store.get_bool("text").is_err());
}

#[test]
fn sqlite_bool_keeps_its_kind() {
    let store = SqliteStateStore::open_in_memory().unwrap();
    store.set("s", StoredValue::from("true")).unwrap();
    store.set("b", StoredValue::from(true)).unwrap();
    assert_eq!(store.get("s").unwrap(), Some(StoredValue::Str("true".into())));
    assert_eq!(store.get("b").unwrap(), Some(StoredValue::Bool(true)));
}

#[test]
fn sqlite_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");
    {
        let store = SqliteStateStore::open(&path).unwrap();
        let mut batch = WriteBatch::new();
        batch.put("lock.isLocked", true).put("device.serial", "SN-1");
        store.apply(batch).unwrap();
    }
    let store = SqliteStateStore::open(&path).unwrap();
    assert_eq!(store.get_bool("lock.isLocked").unwrap(), Some(true));
    assert_eq!(store.get_str("device.serial").unwrap().as_deref(), Some("SN-1"));
}

#[test]
fn memory_store_failed_write_changes_nothing() {
    let store = MemoryStateStore::new();
    store.set("k", StoredValue::from("before")).unwrap();
    store.set_fail_writes(true);

    let mut batch = WriteBatch::new();
    batch.put("k", "after").put("other", true);
    assert!(matches!(store.apply(batch), Err(StorageError::WriteRejected(_))));

    store.set_fail_writes(false);
    assert_eq!(store.get_str("k").unwrap().as_deref(), Some("before"));
    assert!(store.get("other").unwrap().is_none());
    assert_eq!(store.batches_applied(), 1);
}

#[test]
fn empty_batch_is_a_noop() {
    let store = MemoryStateStore::new();
    store.apply(WriteBatch::new()).unwrap();
    assert_eq!(store.batches_applied(), 0);
}

#[test]
fn prefix_scan_is_sorted() {
    let store = SqliteStateStore::open_in_memory().unwrap();
    let mut batch = WriteBatch::new();
    batch.put("lock.reason", "NONE").put("lock.isLocked", false).put("locker", "x");
    store.apply(batch).unwrap();
    assert_eq!(
        store.keys_with_prefix("lock.").unwrap(),
        vec!["lock.isLocked".to_string(), "lock.reason".to_string()]
    );
}
