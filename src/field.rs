use crate::access::AccessToken;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};

/// Reserved key identifying the item class in composed queries and records.
pub const CLASS_KEY: &str = "class";
/// Reserved key carrying the encoded value payload.
pub const PAYLOAD_KEY: &str = "payload";

/// Well-known attribute keys shared by the built-in item classes.
pub const SERVICE_KEY: &str = "service";
pub const ACCOUNT_KEY: &str = "account";
pub const SERVER_KEY: &str = "server";
pub const ACCESSIBILITY_KEY: &str = "accessibility";
pub const ACCESS_CONTROL_KEY: &str = "access-control";

/// Validates that the provided key is non-empty and contains only supported characters.
pub(crate) fn validate_key(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::EmptyComponent { field });
    }

    if !value
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '.'))
    {
        return Err(Error::InvalidCharacters {
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}

/// A single attribute value as it appears in a backend record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttrValue {
    Text(String),
    Number(i64),
    Bytes(Vec<u8>),
    Flag(bool),
    Token(AccessToken),
}

impl AttrValue {
    /// Borrow the value as text when it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the value as bytes when it is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttrValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the value as an access control token when it is one.
    pub fn as_token(&self) -> Option<&AccessToken> {
        match self {
            AttrValue::Token(token) => Some(token),
            _ => None,
        }
    }

    pub(crate) fn key_segment(&self) -> Option<String> {
        match self {
            AttrValue::Text(value) => Some(value.clone()),
            AttrValue::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value)
    }
}

/// One named, typed slot on a [`SecureItem`](crate::item::SecureItem).
///
/// A field maps to exactly one backend attribute key. Its `constraints` may
/// force values onto *other* backend keys in the composed query (the access
/// control field forces the accessibility key this way), never onto its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeField {
    backend_key: String,
    value: Option<AttrValue>,
    constraints: Vec<(String, AttrValue)>,
}

impl AttributeField {
    /// Declare an empty field for the given backend key.
    pub fn new(backend_key: impl Into<String>) -> Result<Self> {
        let backend_key = backend_key.into();
        validate_key(&backend_key, "backend key")?;
        if backend_key == CLASS_KEY || backend_key == PAYLOAD_KEY {
            return Err(Error::InvalidFieldState {
                reason: format!("`{backend_key}` is a reserved backend key"),
            });
        }
        Ok(Self {
            backend_key,
            value: None,
            constraints: Vec::new(),
        })
    }

    /// Declare a field holding an initial value.
    pub fn with_value(backend_key: impl Into<String>, value: impl Into<AttrValue>) -> Result<Self> {
        let mut field = Self::new(backend_key)?;
        field.value = Some(value.into());
        Ok(field)
    }

    /// Register a constraint override applied during query composition,
    /// consuming and returning the field for declaration-time chaining.
    pub fn with_constraint(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> Result<Self> {
        let key: String = key.into();
        self.set_constraint(&key, value.into())?;
        Ok(self)
    }

    /// Backend attribute key this field maps to.
    pub fn backend_key(&self) -> &str {
        &self.backend_key
    }

    /// Current value, if any.
    pub fn value(&self) -> Option<&AttrValue> {
        self.value.as_ref()
    }

    /// Registered constraint overrides in registration order.
    pub fn constraints(&self) -> &[(String, AttrValue)] {
        &self.constraints
    }

    pub(crate) fn set_value(&mut self, value: Option<AttrValue>) {
        self.value = value;
    }

    pub(crate) fn set_constraint(&mut self, key: &str, value: AttrValue) -> Result<()> {
        if key == self.backend_key {
            return Err(Error::InvalidFieldState {
                reason: format!("constraint may not target the field's own key `{key}`"),
            });
        }
        validate_key(key, "constraint key")?;

        if let Some(entry) = self.constraints.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.constraints.push((key.to_string(), value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(AttributeField::new("account").is_ok());
        assert!(AttributeField::new("access-control").is_ok());
        assert!(AttributeField::new("").is_err());
        assert!(AttributeField::new("Account").is_err());
        assert!(AttributeField::new("acc ount").is_err());
    }

    #[test]
    fn reserved_keys_rejected() {
        assert!(AttributeField::new(CLASS_KEY).is_err());
        assert!(AttributeField::new(PAYLOAD_KEY).is_err());
    }

    #[test]
    fn constraint_on_own_key_rejected() {
        let field = AttributeField::new("service").unwrap();
        let err = field.with_constraint("service", "forced").unwrap_err();
        assert!(matches!(err, Error::InvalidFieldState { .. }));
    }

    #[test]
    fn constraint_replaces_same_key() {
        let field = AttributeField::new("access-control")
            .unwrap()
            .with_constraint("accessibility", "when-unlocked")
            .unwrap()
            .with_constraint("accessibility", "after-first-unlock")
            .unwrap();

        assert_eq!(field.constraints().len(), 1);
        assert_eq!(
            field.constraints()[0].1,
            AttrValue::Text("after-first-unlock".into())
        );
    }
}
