use thiserror::Error;

/// Result alias for all keyslot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical error surface.
///
/// `ItemNotFound` is the one non-exceptional variant: absence of a secret is
/// an expected outcome and is mapped to the declared default at the
/// [`CachedProperty`](crate::cached::CachedProperty) layer. Every other
/// variant surfaces to the immediate caller unmodified; the core performs no
/// retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{entity} not found")]
    ItemNotFound { entity: String },
    #[error("invalid field state: {reason}")]
    InvalidFieldState { reason: String },
    #[error("unhandled backend error: {detail} (code {code})")]
    UnhandledBackend { code: i32, detail: String },
    #[error("access control creation failed: {reason}")]
    AccessControlCreationFailed { reason: String },
    #[error("backend reported success but returned no usable access control token")]
    AccessControlCreationFailedUnknown,
    #[error("unknown accessibility level: {0}")]
    UnknownAccessibility(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unexpected record shape: {detail}")]
    UnexpectedRecordShape { detail: String },
    #[error("record for {entity} carries no payload")]
    MissingPayload { entity: String },
    #[error("stored blob is absent or not in the expected legacy shape")]
    UnexpectedTypeFound,
    #[error("{field} contains invalid characters: {value}")]
    InvalidCharacters { field: &'static str, value: String },
    #[error("{field} must not be empty")]
    EmptyComponent { field: &'static str },
}

impl Error {
    /// Whether the error represents expected absence rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ItemNotFound { .. })
    }
}
