//! Declarative typed secret slots over a keychain-like secure store.
//!
//! Clients declare [`SecureItem`]s (attribute-keyed secret shapes) and
//! wrap them in [`CachedProperty`]s that compose backend queries, route
//! reads and writes through a pluggable [`StorageAdapter`], and decode
//! structured values through a [`Codec`]. The backend remains the single
//! source of truth; the refresh policy governs when the in-memory value is
//! trusted.

pub mod access;
pub mod adapter;
pub mod cached;
pub mod codec;
pub mod errors;
pub mod field;
pub mod item;
pub mod legacy;
pub mod query;

pub use access::{AccessFlags, AccessToken, Accessibility};
#[cfg(feature = "file")]
pub use adapter::file::FileAdapter;
pub use adapter::{MemoryAdapter, StorageAdapter};
pub use cached::{CachedProperty, LossyProperty, RefreshPolicy};
pub use codec::{Codec, JsonCodec};
pub use errors::{Error, Result};
pub use field::{AttrValue, AttributeField};
pub use item::{ItemClass, SecureItem};
pub use legacy::{LegacyCredentialRecord, LegacyMigrator};
pub use query::{QueryPurpose, Record};
