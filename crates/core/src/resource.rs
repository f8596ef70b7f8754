use std::fmt;

use serde::{Deserialize, Serialize};

/// String form of [`TypeCode::Lock`], kept for wire compatibility.
pub const LOCK_TYPE: &str = "lock";

/// String form of [`TypeCode::Presence`], kept for wire compatibility.
pub const PRESENCE_TYPE: &str = "presence";

/// Distinguishes exclusive locks from advisory presences.
///
/// Serialized as its integer code. Codes outside the known range collapse
/// to [`TypeCode::Unknown`] on deserialization; request validation rejects
/// `Unknown` wherever a concrete type is required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum TypeCode {
    #[default]
    Unknown,
    Lock,
    Presence,
}

impl TypeCode {
    /// The wire string for this code (`""` for `Unknown`).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Lock => LOCK_TYPE,
            Self::Presence => PRESENCE_TYPE,
        }
    }

    /// Parse a wire string into a code. Unrecognized strings are `Unknown`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            LOCK_TYPE => Self::Lock,
            PRESENCE_TYPE => Self::Presence,
            _ => Self::Unknown,
        }
    }
}

impl From<i32> for TypeCode {
    fn from(code: i32) -> Self {
        match code {
            1 => Self::Lock,
            2 => Self::Presence,
            _ => Self::Unknown,
        }
    }
}

impl From<TypeCode> for i32 {
    fn from(code: TypeCode) -> i32 {
        match code {
            TypeCode::Unknown => 0,
            TypeCode::Lock => 1,
            TypeCode::Presence => 2,
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named lease request: key, claimant owner, opaque value, and type.
///
/// `type_code` is authoritative; the string `type` field is carried for
/// older readers and regenerated from the code whenever the code is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub key: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub type_code: TypeCode,
}

impl Resource {
    /// Build a resource with `type` derived from `type_code`.
    pub fn new(
        key: impl Into<String>,
        owner: impl Into<String>,
        value: impl Into<String>,
        type_code: TypeCode,
    ) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            value: value.into(),
            type_name: type_code.name().to_owned(),
            type_code,
        }
    }

    /// Reconcile the two type fields.
    ///
    /// A known `type_code` regenerates the string form; an `Unknown` code
    /// is backfilled from the string, which is preserved verbatim for
    /// readers that still rely on it.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut resource = self.clone();
        if self.type_code == TypeCode::Unknown {
            resource.type_code = TypeCode::from_name(&self.type_name);
        } else {
            resource.type_name = self.type_code.name().to_owned();
        }
        resource
    }
}
