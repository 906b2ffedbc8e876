//! One-shot migration from the old monolithic credential blob.
//!
//! The legacy format stored user id, refresh token, and access token in a
//! single flat record with no attribute-key mapping. The migrator reads it
//! once, hands back the discrete fields, and purges every legacy-format
//! entry after a successful migration.

use crate::adapter::StorageAdapter;
use crate::cached::CachedProperty;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Well-known adapter key of the monolithic legacy blob.
pub const LEGACY_KEY: &str = "legacy-credentials";

/// Flat, ad-hoc record produced only by the migrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyCredentialRecord {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// One-shot adapter from the legacy blob to the field model.
pub struct LegacyMigrator<A: StorageAdapter> {
    adapter: A,
    legacy_key: String,
}

impl<A: StorageAdapter> LegacyMigrator<A> {
    /// Construct a migrator reading from the well-known legacy key.
    pub fn new(adapter: A) -> Self {
        Self::with_key(adapter, LEGACY_KEY)
    }

    /// Construct a migrator reading from a custom legacy key.
    pub fn with_key(adapter: A, legacy_key: impl Into<String>) -> Self {
        Self {
            adapter,
            legacy_key: legacy_key.into(),
        }
    }

    /// Read the monolithic blob.
    ///
    /// Fails with [`Error::UnexpectedTypeFound`] when the blob is absent or
    /// not in the expected legacy shape; extra keys in the blob are
    /// tolerated.
    pub fn attempt_load(&self) -> Result<LegacyCredentialRecord> {
        let bytes = self.adapter.load(&self.legacy_key).map_err(|err| match err {
            Error::ItemNotFound { .. } => Error::UnexpectedTypeFound,
            other => other,
        })?;
        serde_json::from_slice(&bytes).map_err(|_| Error::UnexpectedTypeFound)
    }

    /// Remove every legacy-format entry.
    pub fn purge(&self) -> Result<()> {
        let prefix = format!("{}/", self.legacy_key);
        for (key, _) in self.adapter.load_all()? {
            if key == self.legacy_key || key.starts_with(&prefix) {
                self.adapter.delete(&key)?;
                debug!(key = %key, "purged legacy entry");
            }
        }
        Ok(())
    }

    /// Decompose the legacy blob into discrete cached properties, then
    /// purge the legacy entries.
    ///
    /// Returns `false` (without touching the properties) when no legacy
    /// blob exists; any other failure surfaces to the caller before the
    /// purge runs.
    pub fn migrate_into(
        &self,
        user_id: &mut CachedProperty<u64>,
        refresh_token: &mut CachedProperty<String>,
        access_token: &mut CachedProperty<String>,
    ) -> Result<bool> {
        let record = match self.attempt_load() {
            Ok(record) => record,
            Err(Error::UnexpectedTypeFound) => return Ok(false),
            Err(err) => return Err(err),
        };

        if let Some(value) = record.user_id {
            user_id.set(Some(value))?;
        }
        if let Some(value) = record.refresh_token {
            refresh_token.set(Some(value))?;
        }
        if let Some(value) = record.access_token {
            access_token.set(Some(value))?;
        }

        self.purge()?;
        info!("migrated legacy credential record");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;

    #[test]
    fn absent_blob_is_unexpected_type() {
        let migrator = LegacyMigrator::new(MemoryAdapter::new());
        assert_eq!(
            migrator.attempt_load().unwrap_err(),
            Error::UnexpectedTypeFound
        );
    }

    #[test]
    fn malformed_blob_is_unexpected_type() {
        let adapter = MemoryAdapter::new();
        adapter.save(LEGACY_KEY, b"\"just a string\"").unwrap();
        let migrator = LegacyMigrator::new(adapter);
        assert_eq!(
            migrator.attempt_load().unwrap_err(),
            Error::UnexpectedTypeFound
        );
    }

    #[test]
    fn loads_partial_records_with_extra_keys() {
        let adapter = MemoryAdapter::new();
        adapter
            .save(
                LEGACY_KEY,
                br#"{"user_id":42,"access_token":"a","unknown":"ignored"}"#,
            )
            .unwrap();
        let migrator = LegacyMigrator::new(adapter);
        let record = migrator.attempt_load().unwrap();
        assert_eq!(record.user_id, Some(42));
        assert_eq!(record.refresh_token, None);
        assert_eq!(record.access_token.as_deref(), Some("a"));
    }
}
