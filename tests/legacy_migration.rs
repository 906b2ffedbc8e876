use keyslot::legacy::LEGACY_KEY;
use keyslot::{
    CachedProperty, LegacyMigrator, MemoryAdapter, RefreshPolicy, SecureItem, StorageAdapter,
};
use std::sync::Arc;

fn slot<T>(adapter: &MemoryAdapter, account: &str) -> CachedProperty<T>
where
    T: Clone + PartialEq + serde::Serialize + serde::de::DeserializeOwned,
{
    let item = SecureItem::generic_account("app.auth", account).unwrap();
    CachedProperty::new(item, Arc::new(adapter.clone()), RefreshPolicy::OnAccess)
}

#[test]
fn monolithic_record_decomposes_into_discrete_fields() {
    let adapter = MemoryAdapter::new();
    adapter
        .save(
            LEGACY_KEY,
            br#"{"user_id":42,"refresh_token":"r-tok","access_token":"a-tok"}"#,
        )
        .unwrap();

    let migrator = LegacyMigrator::new(adapter.clone());
    let record = migrator.attempt_load().unwrap();
    assert_eq!(record.user_id, Some(42));
    assert_eq!(record.refresh_token.as_deref(), Some("r-tok"));
    assert_eq!(record.access_token.as_deref(), Some("a-tok"));

    let mut user_id = slot::<u64>(&adapter, "user-id");
    let mut refresh = slot::<String>(&adapter, "refresh-token");
    let mut access = slot::<String>(&adapter, "access-token");

    assert!(migrator
        .migrate_into(&mut user_id, &mut refresh, &mut access)
        .unwrap());

    assert_eq!(user_id.get().unwrap(), Some(42));
    assert_eq!(refresh.get().unwrap().as_deref(), Some("r-tok"));
    assert_eq!(access.get().unwrap().as_deref(), Some("a-tok"));
}

#[test]
fn purge_leaves_no_legacy_entries_behind() {
    let adapter = MemoryAdapter::new();
    adapter
        .save(LEGACY_KEY, br#"{"user_id":7}"#)
        .unwrap();

    let migrator = LegacyMigrator::new(adapter.clone());
    migrator.purge().unwrap();

    assert!(adapter
        .load_all()
        .unwrap()
        .iter()
        .all(|(key, _)| key != LEGACY_KEY));
}

#[test]
fn migration_is_one_shot() {
    let adapter = MemoryAdapter::new();
    adapter
        .save(LEGACY_KEY, br#"{"user_id":7}"#)
        .unwrap();

    let migrator = LegacyMigrator::new(adapter.clone());
    let mut user_id = slot::<u64>(&adapter, "user-id");
    let mut refresh = slot::<String>(&adapter, "refresh-token");
    let mut access = slot::<String>(&adapter, "access-token");

    assert!(migrator
        .migrate_into(&mut user_id, &mut refresh, &mut access)
        .unwrap());

    // The blob is gone; a second run is a clean no-op.
    assert!(!migrator
        .migrate_into(&mut user_id, &mut refresh, &mut access)
        .unwrap());
    assert_eq!(user_id.get().unwrap(), Some(7));
}
