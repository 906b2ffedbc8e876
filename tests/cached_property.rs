use keyslot::field::{ACCOUNT_KEY, PAYLOAD_KEY, SERVICE_KEY};
use keyslot::{
    AttrValue, CachedProperty, Error, LossyProperty, MemoryAdapter, QueryPurpose, Record,
    RefreshPolicy, SecureItem, StorageAdapter,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AuthBlob {
    token: String,
}

#[derive(Clone, Default)]
struct CountingAdapter {
    inner: MemoryAdapter,
    loads: Arc<AtomicUsize>,
    saves: Arc<AtomicUsize>,
}

impl CountingAdapter {
    fn new() -> Self {
        Self::default()
    }

    fn load_calls(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn save_calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StorageAdapter for CountingAdapter {
    fn load(&self, key: &str) -> keyslot::Result<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(key)
    }

    fn load_all(&self) -> keyslot::Result<Vec<(String, Vec<u8>)>> {
        self.inner.load_all()
    }

    fn save(&self, key: &str, bytes: &[u8]) -> keyslot::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key, bytes)
    }

    fn delete(&self, key: &str) -> keyslot::Result<()> {
        self.inner.delete(key)
    }

    fn delete_all(&self) -> keyslot::Result<()> {
        self.inner.delete_all()
    }
}

fn property(
    adapter: &CountingAdapter,
    policy: RefreshPolicy,
) -> CachedProperty<AuthBlob> {
    let item = SecureItem::generic_account("app.auth", "user-42").unwrap();
    CachedProperty::new(item, Arc::new(adapter.clone()), policy)
}

#[test]
fn write_then_read_reflects_the_stored_record() {
    let adapter = CountingAdapter::new();
    let mut prop = property(&adapter, RefreshPolicy::OnAccess);

    prop.set(Some(AuthBlob {
        token: "abc".into(),
    }))
    .unwrap();

    // The backend record carries the identity attributes plus the payload.
    let raw = Record::from_bytes(
        &adapter
            .inner
            .load("generic-password/app.auth/user-42")
            .unwrap(),
    )
    .unwrap();
    assert_eq!(
        raw.get(SERVICE_KEY),
        Some(&AttrValue::Text("app.auth".into()))
    );
    assert_eq!(
        raw.get(ACCOUNT_KEY),
        Some(&AttrValue::Text("user-42".into()))
    );
    assert!(raw.get(PAYLOAD_KEY).is_some());

    let value = prop.get().unwrap().unwrap();
    assert_eq!(value.token, "abc");

    prop.delete().unwrap();
    assert_eq!(prop.get().unwrap(), None);
}

#[test]
fn on_access_never_serves_stale_cache() {
    let adapter = CountingAdapter::new();
    let mut prop = property(&adapter, RefreshPolicy::OnAccess);

    prop.set(Some(AuthBlob {
        token: "abc".into(),
    }))
    .unwrap();

    // Simulate an out-of-process deletion between write and read.
    adapter
        .inner
        .delete("generic-password/app.auth/user-42")
        .unwrap();

    assert_eq!(prop.get().unwrap(), None);
}

#[test]
fn never_policy_trusts_first_read_until_invalidated() {
    let adapter = CountingAdapter::new();
    let mut writer = property(&adapter, RefreshPolicy::OnAccess);
    let mut reader = property(&adapter, RefreshPolicy::Never);

    writer
        .set(Some(AuthBlob {
            token: "first".into(),
        }))
        .unwrap();
    assert_eq!(reader.get().unwrap().unwrap().token, "first");

    writer
        .set(Some(AuthBlob {
            token: "second".into(),
        }))
        .unwrap();

    // Cached value is served without a backend round-trip.
    let loads_before = adapter.load_calls();
    assert_eq!(reader.get().unwrap().unwrap().token, "first");
    assert_eq!(adapter.load_calls(), loads_before);

    reader.invalidate();
    assert_eq!(reader.get().unwrap().unwrap().token, "second");
}

#[test]
fn unchanged_write_is_suppressed_under_on_access() {
    let adapter = CountingAdapter::new();
    let mut prop = property(&adapter, RefreshPolicy::OnAccess);

    let blob = AuthBlob {
        token: "abc".into(),
    };
    prop.set(Some(blob.clone())).unwrap();
    prop.set(Some(blob)).unwrap();

    assert_eq!(adapter.save_calls(), 1);
}

#[test]
fn absence_is_distinguishable_from_failure() {
    let adapter = CountingAdapter::new();

    // Deleting a key that was never written surfaces ItemNotFound.
    let mut prop = property(&adapter, RefreshPolicy::OnAccess);
    let err = prop.set(None).unwrap_err();
    assert!(err.is_not_found());

    // Reading an absent secret is not an error; a declared default is served.
    let item = SecureItem::generic_account("app.auth", "user-42").unwrap();
    let mut with_default: CachedProperty<String> =
        CachedProperty::new(item, Arc::new(adapter.clone()), RefreshPolicy::OnAccess)
            .default_value("fallback".into());
    assert_eq!(with_default.get().unwrap().as_deref(), Some("fallback"));
}

#[test]
fn strict_property_surfaces_decode_failures_and_lossy_masks_them() {
    let adapter = CountingAdapter::new();

    // Store a record whose payload is not valid JSON for AuthBlob.
    let item = SecureItem::generic_account("app.auth", "user-42").unwrap();
    let query = item
        .compose_query(QueryPurpose::Write, Some(b"not-a-blob"))
        .unwrap();
    adapter
        .inner
        .save(
            "generic-password/app.auth/user-42",
            &query.to_bytes().unwrap(),
        )
        .unwrap();

    let mut strict = property(&adapter, RefreshPolicy::OnAccess);
    assert!(matches!(strict.get().unwrap_err(), Error::Decode(_)));

    let mut lossy = LossyProperty::new(property(&adapter, RefreshPolicy::OnAccess));
    assert_eq!(lossy.get(), None);
}
