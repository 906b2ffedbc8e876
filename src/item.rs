use crate::errors::{Error, Result};
use crate::field::{
    AttrValue, AttributeField, ACCESS_CONTROL_KEY, ACCOUNT_KEY, SERVER_KEY, SERVICE_KEY,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of backend item classes.
///
/// Each class carries its own canonical primary-key field set; per-class
/// behaviour is dispatched through the query composition methods rather than
/// inheritance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ItemClass {
    GenericPassword,
    InternetPassword,
}

impl ItemClass {
    /// Stable string representation used in composed queries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenericPassword => "generic-password",
            Self::InternetPassword => "internet-password",
        }
    }

    /// Canonical primary-key field set for the class, in scoping order:
    /// shared scope first (service, server), instance distinguisher last.
    pub const fn primary_keys(self) -> &'static [&'static str] {
        match self {
            Self::GenericPassword => &[SERVICE_KEY, ACCOUNT_KEY],
            Self::InternetPassword => &[SERVER_KEY, ACCOUNT_KEY],
        }
    }
}

impl fmt::Display for ItemClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared secret "shape": an item class, the primary-key fields that
/// scope it within the backend namespace, and an ordered list of attribute
/// fields.
///
/// Field values are mutated on read (after extraction) and write (before
/// composition); the item itself is never persisted independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureItem {
    class: ItemClass,
    primary_keys: Vec<String>,
    fields: Vec<AttributeField>,
}

impl SecureItem {
    /// Declare an item with the class's canonical primary-key set.
    pub fn new(class: ItemClass, fields: Vec<AttributeField>) -> Result<Self> {
        let primary_keys = class
            .primary_keys()
            .iter()
            .map(|key| key.to_string())
            .collect();
        Self::with_primary_keys(class, primary_keys, fields)
    }

    /// Declare an item with an explicit primary-key field set.
    ///
    /// The primary keys must be a subset of the declared field keys, and
    /// field keys must be unique.
    pub fn with_primary_keys(
        class: ItemClass,
        primary_keys: Vec<String>,
        fields: Vec<AttributeField>,
    ) -> Result<Self> {
        if primary_keys.is_empty() {
            return Err(Error::InvalidFieldState {
                reason: "an item requires at least one primary key field".to_string(),
            });
        }

        for (idx, field) in fields.iter().enumerate() {
            if fields[..idx]
                .iter()
                .any(|other| other.backend_key() == field.backend_key())
            {
                return Err(Error::InvalidFieldState {
                    reason: format!("duplicate field for backend key `{}`", field.backend_key()),
                });
            }
        }

        for key in &primary_keys {
            if !fields.iter().any(|field| field.backend_key() == key) {
                return Err(Error::InvalidFieldState {
                    reason: format!("primary key `{key}` has no matching field"),
                });
            }
        }

        Ok(Self {
            class,
            primary_keys,
            fields,
        })
    }

    /// Convenience: a generic-password item scoped to a service, with an
    /// unset account field and an access control slot.
    pub fn generic(service: impl Into<String>) -> Result<Self> {
        let service: String = service.into();
        Self::new(
            ItemClass::GenericPassword,
            vec![
                AttributeField::with_value(SERVICE_KEY, service)?,
                AttributeField::new(ACCOUNT_KEY)?,
                AttributeField::new(ACCESS_CONTROL_KEY)?,
            ],
        )
    }

    /// Convenience: a generic-password item fully scoped to one instance.
    pub fn generic_account(
        service: impl Into<String>,
        account: impl Into<String>,
    ) -> Result<Self> {
        let mut item = Self::generic(service)?;
        item.set_value(ACCOUNT_KEY, Some(AttrValue::Text(account.into())))?;
        Ok(item)
    }

    /// Backend class of the item.
    pub fn class(&self) -> ItemClass {
        self.class
    }

    /// Primary-key field keys in scoping order.
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> &[AttributeField] {
        &self.fields
    }

    /// Look up a field by backend key.
    pub fn field(&self, key: &str) -> Option<&AttributeField> {
        self.fields.iter().find(|field| field.backend_key() == key)
    }

    /// Set or clear a field value through the generic setter.
    ///
    /// The access control field is deliberately excluded: replacing a token
    /// requires backend re-provisioning semantics and must go through
    /// [`AccessToken::attach`](crate::access::AccessToken::attach).
    pub fn set_value(&mut self, key: &str, value: Option<AttrValue>) -> Result<()> {
        if key == ACCESS_CONTROL_KEY {
            return Err(Error::InvalidFieldState {
                reason: "access control is replaced via AccessToken::attach, not set_value"
                    .to_string(),
            });
        }
        let field = self.field_mut(key).ok_or_else(|| Error::InvalidFieldState {
            reason: format!("item declares no field for backend key `{key}`"),
        })?;
        field.set_value(value);
        Ok(())
    }

    pub(crate) fn field_mut(&mut self, key: &str) -> Option<&mut AttributeField> {
        self.fields
            .iter_mut()
            .find(|field| field.backend_key() == key)
    }

    pub(crate) fn fields_mut(&mut self) -> &mut [AttributeField] {
        &mut self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_keys_must_have_fields() {
        let fields = vec![AttributeField::new(SERVICE_KEY).unwrap()];
        let err = SecureItem::new(ItemClass::GenericPassword, fields).unwrap_err();
        assert!(matches!(err, Error::InvalidFieldState { .. }));
    }

    #[test]
    fn duplicate_field_keys_rejected() {
        let fields = vec![
            AttributeField::new(SERVICE_KEY).unwrap(),
            AttributeField::new(ACCOUNT_KEY).unwrap(),
            AttributeField::new(SERVICE_KEY).unwrap(),
        ];
        let err = SecureItem::new(ItemClass::GenericPassword, fields).unwrap_err();
        assert!(matches!(err, Error::InvalidFieldState { .. }));
    }

    #[test]
    fn generic_item_declares_canonical_shape() {
        let item = SecureItem::generic("app.auth").unwrap();
        assert_eq!(item.class(), ItemClass::GenericPassword);
        assert_eq!(item.primary_keys(), &[SERVICE_KEY, ACCOUNT_KEY]);
        assert_eq!(
            item.field(SERVICE_KEY).unwrap().value(),
            Some(&AttrValue::Text("app.auth".into()))
        );
        assert!(item.field(ACCOUNT_KEY).unwrap().value().is_none());
    }

    #[test]
    fn generic_setter_refuses_access_control() {
        let mut item = SecureItem::generic("app.auth").unwrap();
        let err = item
            .set_value(ACCESS_CONTROL_KEY, Some(AttrValue::Flag(true)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFieldState { .. }));
    }

    #[test]
    fn unknown_key_rejected() {
        let mut item = SecureItem::generic("app.auth").unwrap();
        assert!(item
            .set_value("label", Some(AttrValue::Text("x".into())))
            .is_err());
    }
}
