//! Query composition and result extraction.
//!
//! Composition turns an item's declared fields into a single backend query;
//! extraction repopulates fields from a raw backend record. Both are pure
//! data transformations: executing a composed query against a
//! [`StorageAdapter`](crate::adapter::StorageAdapter) happens in
//! [`SecureItem::lookup_all`] and the cached property layer.

use crate::errors::{Error, Result};
use crate::field::{AttrValue, CLASS_KEY, PAYLOAD_KEY};
use crate::item::SecureItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Purpose a query is composed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
    /// Look up a single fully-scoped instance, attributes and payload.
    LookupOne,
    /// Enumerate every instance sharing the currently-valued primary keys.
    LookupAll,
    /// Persist the item's attributes together with an encoded payload.
    Write,
    /// Remove a single fully-scoped instance.
    Delete,
}

/// Key/value record exchanged with the backend.
///
/// The same shape serves both directions: a composed query on the way out
/// and a raw result record on the way back. The item class lives under the
/// reserved `class` key and the encoded value under the reserved `payload`
/// key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, AttrValue>);

impl Record {
    /// Value stored under the given key, if any.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: AttrValue) {
        self.0.insert(key.into(), value);
    }

    /// Number of keys in the record.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record carries no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    /// Payload bytes stored under the reserved key.
    ///
    /// A payload of any other value type is a backend contract violation.
    pub fn payload(&self) -> Result<Option<&[u8]>> {
        match self.0.get(PAYLOAD_KEY) {
            None => Ok(None),
            Some(AttrValue::Bytes(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(Error::UnexpectedRecordShape {
                detail: format!("payload key holds a non-binary value: {other:?}"),
            }),
        }
    }

    /// Serialize the record for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::Encode(err.to_string()))
    }

    /// Parse stored bytes back into a record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| Error::UnexpectedRecordShape {
            detail: err.to_string(),
        })
    }

    /// Whether this record satisfies every attribute pair of `query`
    /// (the payload key is never part of the match).
    pub fn matches(&self, query: &Record) -> bool {
        query
            .0
            .iter()
            .filter(|(key, _)| key.as_str() != PAYLOAD_KEY)
            .all(|(key, value)| self.0.get(key) == Some(value))
    }

    /// Derive the adapter storage key from the class and primary-key values.
    pub(crate) fn storage_key(&self, primary_keys: &[String]) -> Result<String> {
        let class = self
            .0
            .get(CLASS_KEY)
            .and_then(AttrValue::as_text)
            .ok_or_else(|| Error::InvalidFieldState {
                reason: "composed query is missing the item class".to_string(),
            })?;

        let mut segments = vec![encode_segment(class)];
        for key in primary_keys {
            let value = self.0.get(key).ok_or_else(|| Error::InvalidFieldState {
                reason: format!("primary key `{key}` has no value"),
            })?;
            let segment = value.key_segment().ok_or_else(|| Error::InvalidFieldState {
                reason: format!("primary key `{key}` holds a value unusable as a key segment"),
            })?;
            segments.push(encode_segment(&segment));
        }
        Ok(segments.join("/"))
    }

    /// Join the primary-key values not fixed by `scope` into an instance key.
    pub(crate) fn instance_key(&self, scope: &Record, primary_keys: &[String]) -> Option<String> {
        let free: Vec<String> = primary_keys
            .iter()
            .filter(|key| scope.0.get(*key).is_none())
            .filter_map(|key| self.0.get(key).and_then(AttrValue::key_segment))
            .collect();
        if free.is_empty() {
            None
        } else {
            Some(free.join("/"))
        }
    }
}

/// Percent-encode anything outside the safe storage-key charset.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02x}")),
        }
    }
    out
}

impl SecureItem {
    /// Compose a backend query for the given purpose.
    ///
    /// `Write` requires the encoded payload; lookup queries request the full
    /// record, attributes and payload, back from the backend.
    pub fn compose_query(&self, purpose: QueryPurpose, payload: Option<&[u8]>) -> Result<Record> {
        self.compose_query_with(&[], purpose, payload)
    }

    /// Compose a backend query with per-call instance key overrides applied
    /// on top of the declared field values.
    ///
    /// Constraint overrides are applied last, in field-declaration order, so
    /// when two fields target the same backend key the later-declared field
    /// wins.
    pub fn compose_query_with(
        &self,
        overrides: &[(&str, AttrValue)],
        purpose: QueryPurpose,
        payload: Option<&[u8]>,
    ) -> Result<Record> {
        let mut query = Record::default();
        query.insert(CLASS_KEY, AttrValue::Text(self.class().as_str().to_string()));

        match purpose {
            QueryPurpose::LookupAll => {
                for key in self.primary_keys() {
                    if let Some(value) = self.field(key).and_then(|field| field.value()) {
                        query.insert(key.clone(), value.clone());
                    }
                }
            }
            _ => {
                for field in self.fields() {
                    if let Some(value) = field.value() {
                        query.insert(field.backend_key(), value.clone());
                    }
                }
            }
        }

        for (key, value) in overrides {
            query.insert(*key, value.clone());
        }

        // Fail fast before a query could silently scope a secret to the
        // wrong namespace.
        if purpose != QueryPurpose::LookupAll {
            for key in self.primary_keys() {
                if query.get(key).is_none() {
                    return Err(Error::InvalidFieldState {
                        reason: format!("primary key `{key}` has no value"),
                    });
                }
            }
        }

        for field in self.fields() {
            for (key, value) in field.constraints() {
                query.insert(key.clone(), value.clone());
            }
        }

        match purpose {
            QueryPurpose::Write => {
                let payload = payload.ok_or_else(|| Error::InvalidFieldState {
                    reason: "a write query requires a payload".to_string(),
                })?;
                query.insert(PAYLOAD_KEY, AttrValue::Bytes(payload.to_vec()));
            }
            _ if payload.is_some() => {
                return Err(Error::InvalidFieldState {
                    reason: "only a write query carries a payload".to_string(),
                });
            }
            _ => {}
        }

        Ok(query)
    }

    /// Derive the adapter storage key for this fully-scoped item.
    pub fn storage_key(&self) -> Result<String> {
        self.compose_query(QueryPurpose::Delete, None)?
            .storage_key(self.primary_keys())
    }

    /// Repopulate field values from a raw backend record and return the
    /// payload, if present.
    ///
    /// Keys absent from the record leave fields at their prior value: a
    /// filtered backend response may omit keys the caller didn't request.
    pub fn extract_result(&mut self, raw: &Record, expect_payload: bool) -> Result<Option<Vec<u8>>> {
        if let Some(AttrValue::Text(class)) = raw.get(CLASS_KEY) {
            if class != self.class().as_str() {
                return Err(Error::UnexpectedRecordShape {
                    detail: format!(
                        "record class `{class}` does not match item class `{}`",
                        self.class()
                    ),
                });
            }
        }

        let payload = raw.payload()?.map(|bytes| bytes.to_vec());
        if expect_payload && payload.is_none() {
            return Err(Error::MissingPayload {
                entity: self.class().as_str().to_string(),
            });
        }

        for field in self.fields_mut() {
            if let Some(value) = raw.get(field.backend_key()) {
                field.set_value(Some(value.clone()));
            }
        }

        Ok(payload)
    }

    /// Extract `(instance key, payload)` pairs from a sequence of stored
    /// records, scoped by the currently-valued primary keys.
    ///
    /// Malformed records are skipped, not fatal: one corrupt entry must not
    /// abort enumeration.
    pub fn extract_all<I>(&self, records: I) -> Result<Vec<(String, Vec<u8>)>>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let scope = self.compose_query(QueryPurpose::LookupAll, None)?;
        let mut out = Vec::new();

        for (key, bytes) in records {
            let raw = match Record::from_bytes(&bytes) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping malformed record");
                    continue;
                }
            };
            if !raw.matches(&scope) {
                continue;
            }
            let payload = match raw.payload() {
                Ok(Some(payload)) => payload.to_vec(),
                Ok(None) => {
                    warn!(key = %key, "skipping record without payload");
                    continue;
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping record with unusable payload");
                    continue;
                }
            };
            let instance = raw
                .instance_key(&scope, self.primary_keys())
                .unwrap_or(key);
            out.push((instance, payload));
        }

        Ok(out)
    }

    /// Execute a lookup-all against an adapter.
    pub fn lookup_all(&self, adapter: &dyn crate::adapter::StorageAdapter) -> Result<Vec<(String, Vec<u8>)>> {
        self.extract_all(adapter.load_all()?)
    }

    /// Delete every stored instance matching the currently-valued primary
    /// keys.
    pub fn delete_all(&self, adapter: &dyn crate::adapter::StorageAdapter) -> Result<()> {
        let scope = self.compose_query(QueryPurpose::LookupAll, None)?;
        for (key, bytes) in adapter.load_all()? {
            let raw = match Record::from_bytes(&bytes) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            if raw.matches(&scope) {
                adapter.delete(&key)?;
            }
        }
        Ok(())
    }
}
