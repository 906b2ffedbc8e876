//! Typed caching wrapper around one stored secret.
//!
//! A [`CachedProperty`] owns a fully-declared [`SecureItem`] and decides,
//! per its [`RefreshPolicy`], whether a read serves the in-memory value or
//! round-trips to the backend. Backend faults other than absence surface to
//! the caller unmodified; the explicitly-opt-in [`LossyProperty`] is the
//! only place failures are converted into an absent value.

use crate::access::AccessToken;
use crate::adapter::StorageAdapter;
use crate::codec::{Codec, JsonCodec};
use crate::errors::{Error, Result};
use crate::item::SecureItem;
use crate::query::{QueryPurpose, Record};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Rule governing whether a cached in-memory value is trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Every read round-trips to the backend; the cache only detects
    /// unchanged values for write suppression.
    #[default]
    OnAccess,
    /// The backend is consulted at most once per process lifetime, unless
    /// explicitly invalidated.
    Never,
    /// The cache is trusted until [`CachedProperty::invalidate`] is called.
    OnExplicitInvalidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheState<T> {
    Empty,
    Cached(T),
    Invalid,
}

/// One stored, codable value behind a refresh policy.
pub struct CachedProperty<T, C = JsonCodec> {
    item: SecureItem,
    adapter: Arc<dyn StorageAdapter>,
    codec: C,
    policy: RefreshPolicy,
    default: Option<T>,
    state: CacheState<T>,
}

impl<T> CachedProperty<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned,
{
    /// Declare a property over a fully-scoped item, using the JSON codec.
    pub fn new(item: SecureItem, adapter: Arc<dyn StorageAdapter>, policy: RefreshPolicy) -> Self {
        Self::with_codec(item, adapter, JsonCodec, policy)
    }
}

impl<T, C> CachedProperty<T, C>
where
    T: Clone + PartialEq,
    C: Codec<T>,
{
    /// Declare a property with an explicit codec.
    pub fn with_codec(
        item: SecureItem,
        adapter: Arc<dyn StorageAdapter>,
        codec: C,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            item,
            adapter,
            codec,
            policy,
            default: None,
            state: CacheState::Empty,
        }
    }

    /// Set the value served when the backend reports absence.
    pub fn default_value(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// Borrow the owning item.
    pub fn item(&self) -> &SecureItem {
        &self.item
    }

    /// Active refresh policy.
    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Attach an access control token to the owning item.
    pub fn attach_access(&mut self, token: AccessToken) -> Result<()> {
        token.attach(&mut self.item)
    }

    /// Force the next read to bypass any policy shortcut and re-query.
    pub fn invalidate(&mut self) {
        self.state = CacheState::Invalid;
    }

    /// Read the value, consulting the refresh policy.
    ///
    /// Absence of the secret is not an error: it yields the declared default
    /// (or `None`) and leaves the property `Empty`.
    pub fn get(&mut self) -> Result<Option<T>> {
        if self.policy != RefreshPolicy::OnAccess {
            if let CacheState::Cached(value) = &self.state {
                return Ok(Some(value.clone()));
            }
        }
        self.refresh()
    }

    /// Write or delete the value.
    ///
    /// `None` deletes the stored secret. `Some` performs a delete-then-save
    /// replace: the backend has no native upsert, and the two steps are not
    /// atomic with respect to concurrent writers.
    pub fn set(&mut self, value: Option<T>) -> Result<()> {
        let Some(value) = value else {
            return self.delete();
        };

        if self.policy == RefreshPolicy::OnAccess {
            if let CacheState::Cached(current) = &self.state {
                if *current == value {
                    debug!("value unchanged, write suppressed");
                    return Ok(());
                }
            }
        }

        let payload = self.codec.encode(&value)?;
        let query = self
            .item
            .compose_query(QueryPurpose::Write, Some(&payload))?;
        let key = query.storage_key(self.item.primary_keys())?;

        match self.adapter.delete(&key) {
            Ok(()) => {}
            Err(Error::ItemNotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        self.adapter.save(&key, &query.to_bytes()?)?;
        debug!(key = %key, "secret written");

        self.state = CacheState::Cached(value);
        Ok(())
    }

    /// Delete the stored secret, surfacing [`Error::ItemNotFound`] when
    /// nothing was stored.
    pub fn delete(&mut self) -> Result<()> {
        let query = self.item.compose_query(QueryPurpose::Delete, None)?;
        let key = query.storage_key(self.item.primary_keys())?;
        self.adapter.delete(&key)?;
        debug!(key = %key, "secret deleted");
        self.state = CacheState::Empty;
        Ok(())
    }

    fn refresh(&mut self) -> Result<Option<T>> {
        let query = self.item.compose_query(QueryPurpose::LookupOne, None)?;
        let key = query.storage_key(self.item.primary_keys())?;

        let bytes = match self.adapter.load(&key) {
            Ok(bytes) => bytes,
            Err(Error::ItemNotFound { .. }) => {
                debug!(key = %key, "secret absent, serving default");
                self.state = CacheState::Empty;
                return Ok(self.default.clone());
            }
            Err(err) => return Err(err),
        };

        let raw = Record::from_bytes(&bytes)?;
        let payload = self
            .item
            .extract_result(&raw, true)?
            .ok_or_else(|| Error::MissingPayload { entity: key })?;
        let value = self.codec.decode(&payload)?;

        self.state = CacheState::Cached(value.clone());
        Ok(Some(value))
    }
}

/// Best-effort wrapper that converts every failure into an absent value.
///
/// Kept as a separately named type so the strict contract of
/// [`CachedProperty`] stays the default path; use this only for
/// purely-optional typed fields where "no secret" and "could not decode"
/// may collapse.
pub struct LossyProperty<T, C = JsonCodec> {
    inner: CachedProperty<T, C>,
}

impl<T, C> LossyProperty<T, C>
where
    T: Clone + PartialEq,
    C: Codec<T>,
{
    /// Wrap a strict property.
    pub fn new(inner: CachedProperty<T, C>) -> Self {
        Self { inner }
    }

    /// Read the value, masking any failure as `None`.
    pub fn get(&mut self) -> Option<T> {
        match self.inner.get() {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "lossy read masked a failure");
                None
            }
        }
    }

    /// Write or delete the value, dropping any failure.
    pub fn set(&mut self, value: Option<T>) {
        if let Err(err) = self.inner.set(value) {
            debug!(error = %err, "lossy write dropped a failure");
        }
    }

    /// Force the next read to re-query.
    pub fn invalidate(&mut self) {
        self.inner.invalidate();
    }

    /// Recover the strict property.
    pub fn into_strict(self) -> CachedProperty<T, C> {
        self.inner
    }
}
