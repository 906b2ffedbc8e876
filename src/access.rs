//! Access control policy: builds an opaque token from a declared
//! accessibility level and protection flags, and attaches it to an item.
//!
//! Token creation is fallible and happens before any field mutation, so an
//! invalid flag combination never leaves a partial write behind. Once
//! attached, a token is replaced only through [`AccessToken::attach`]; the
//! generic field setter on [`SecureItem`] refuses the access control key.

use crate::errors::{Error, Result};
use crate::field::{AttrValue, ACCESSIBILITY_KEY, ACCESS_CONTROL_KEY};
use crate::item::SecureItem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Accessibility level required before the backend will release a secret.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Accessibility {
    WhenUnlocked,
    WhenUnlockedThisDeviceOnly,
    AfterFirstUnlock,
    AfterFirstUnlockThisDeviceOnly,
    WhenPasscodeSetThisDeviceOnly,
}

impl Accessibility {
    /// Stable string representation used in composed queries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WhenUnlocked => "when-unlocked",
            Self::WhenUnlockedThisDeviceOnly => "when-unlocked-this-device-only",
            Self::AfterFirstUnlock => "after-first-unlock",
            Self::AfterFirstUnlockThisDeviceOnly => "after-first-unlock-this-device-only",
            Self::WhenPasscodeSetThisDeviceOnly => "when-passcode-set-this-device-only",
        }
    }
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Accessibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "when-unlocked" => Ok(Self::WhenUnlocked),
            "when-unlocked-this-device-only" => Ok(Self::WhenUnlockedThisDeviceOnly),
            "after-first-unlock" => Ok(Self::AfterFirstUnlock),
            "after-first-unlock-this-device-only" => Ok(Self::AfterFirstUnlockThisDeviceOnly),
            "when-passcode-set-this-device-only" => Ok(Self::WhenPasscodeSetThisDeviceOnly),
            other => Err(Error::UnknownAccessibility(other.to_string())),
        }
    }
}

/// Bit-set of protection constraints evaluated by the backend at access time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AccessFlags(u8);

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags(0);
    pub const USER_PRESENCE: AccessFlags = AccessFlags(1);
    pub const BIOMETRY_ANY: AccessFlags = AccessFlags(1 << 1);
    pub const BIOMETRY_CURRENT_SET: AccessFlags = AccessFlags(1 << 2);
    pub const DEVICE_PASSCODE: AccessFlags = AccessFlags(1 << 3);
    pub const APPLICATION_PASSWORD: AccessFlags = AccessFlags(1 << 4);

    /// Whether every flag in `other` is set on `self`.
    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::USER_PRESENCE) {
            names.push("user-presence");
        }
        if self.contains(Self::BIOMETRY_ANY) {
            names.push("biometry-any");
        }
        if self.contains(Self::BIOMETRY_CURRENT_SET) {
            names.push("biometry-current-set");
        }
        if self.contains(Self::DEVICE_PASSCODE) {
            names.push("device-passcode");
        }
        if self.contains(Self::APPLICATION_PASSWORD) {
            names.push("application-password");
        }
        names
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

/// Opaque access control token produced by a successful policy build.
///
/// Immutable once attached; re-provisioning goes through a fresh
/// [`AccessToken::new`] + [`AccessToken::attach`] round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AccessToken {
    accessibility: Accessibility,
    descriptor: String,
}

impl AccessToken {
    /// Build a token from an accessibility level and protection flags.
    ///
    /// Fails with [`Error::AccessControlCreationFailed`] when the combination
    /// is invalid, before any item field has been touched.
    pub fn new(accessibility: Accessibility, flags: AccessFlags) -> Result<Self> {
        if flags.contains(AccessFlags::USER_PRESENCE) && flags != AccessFlags::USER_PRESENCE {
            return Err(Error::AccessControlCreationFailed {
                reason: "user-presence may not be combined with specific constraints".to_string(),
            });
        }

        if flags.contains(AccessFlags::BIOMETRY_ANY)
            && flags.contains(AccessFlags::BIOMETRY_CURRENT_SET)
        {
            return Err(Error::AccessControlCreationFailed {
                reason: "biometry-any conflicts with biometry-current-set".to_string(),
            });
        }

        // Passcode-gated accessibility is meaningless without a constraint to
        // evaluate against the passcode.
        if accessibility == Accessibility::WhenPasscodeSetThisDeviceOnly && flags.is_empty() {
            return Err(Error::AccessControlCreationFailed {
                reason: "when-passcode-set-this-device-only requires at least one constraint flag"
                    .to_string(),
            });
        }

        let descriptor = if flags.is_empty() {
            accessibility.as_str().to_string()
        } else {
            format!("{};{}", accessibility.as_str(), flags.names().join("+"))
        };

        // The backend must never hand back an unusable token.
        if descriptor.is_empty() {
            return Err(Error::AccessControlCreationFailedUnknown);
        }

        Ok(Self {
            accessibility,
            descriptor,
        })
    }

    /// Accessibility level this token encodes.
    pub fn accessibility(&self) -> Accessibility {
        self.accessibility
    }

    /// Resolved backend descriptor.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Attach the token to an item's access control field and register the
    /// accessibility override, so future query composition reflects it
    /// without the caller re-specifying accessibility.
    pub fn attach(self, item: &mut SecureItem) -> Result<()> {
        let accessibility = self.accessibility;
        let field = item
            .field_mut(ACCESS_CONTROL_KEY)
            .ok_or_else(|| Error::InvalidFieldState {
                reason: "item declares no access-control field".to_string(),
            })?;
        field.set_constraint(
            ACCESSIBILITY_KEY,
            AttrValue::Text(accessibility.as_str().to_string()),
        )?;
        field.set_value(Some(AttrValue::Token(self)));
        Ok(())
    }
}
