use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// The persisted image of a granted lease.
///
/// `modified_index` increases by one on every successful mutation of the
/// key (acquire, renewal, release, expiry) and never resets; the
/// expiration scheduler uses it as a fencing token to tell a lease apart
/// from its own renewals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub resource: Resource,
    pub ttl_in_seconds: i64,
    pub modified_index: i64,
}

impl Lock {
    pub fn new(resource: Resource, ttl_in_seconds: i64, modified_index: i64) -> Self {
        Self {
            resource,
            ttl_in_seconds,
            modified_index,
        }
    }

    /// Key of the underlying resource.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.resource.key
    }

    /// Owner of the underlying resource.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.resource.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::TypeCode;

    #[test]
    fn accessors_delegate_to_resource() {
        let lock = Lock::new(Resource::new("k", "o", "v", TypeCode::Lock), 10, 3);
        assert_eq!(lock.key(), "k");
        assert_eq!(lock.owner(), "o");
        assert_eq!(lock.modified_index, 3);
    }
}
