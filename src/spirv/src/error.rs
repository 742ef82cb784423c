use derive_more::Display;

use crate::ops::InvalidEnumValue;
use crate::Id;

/// Errors produced while parsing or reflecting a binary module.
///
/// Everything here indicates a structural problem with the module or the
/// request, not a transient condition; callers generally report it upstream
/// as a capture-format or compiler defect.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum ReflectError {
    /// The word stream is not a valid module.
    #[display(fmt = "invalid module: {}", _0)]
    InvalidModule(&'static str),
    #[display(fmt = "entry point '{}' not found", _0)]
    EntryPointNotFound(String),
    /// The type graph references an ID that never resolved to a type.
    #[display(fmt = "malformed type graph at id {}", _0)]
    MalformedType(Id),
    /// A constant ID could not be evaluated to a scalar value.
    #[display(fmt = "unresolvable constant id {}", _0)]
    UnresolvableConstant(Id),
}

pub type Result<T> = std::result::Result<T, ReflectError>;

impl std::error::Error for ReflectError {}

impl From<InvalidEnumValue> for ReflectError {
    fn from(_: InvalidEnumValue) -> Self {
        Self::InvalidModule("invalid enum operand")
    }
}

impl From<std::str::Utf8Error> for ReflectError {
    fn from(_: std::str::Utf8Error) -> Self {
        Self::InvalidModule("malformed string literal")
    }
}
