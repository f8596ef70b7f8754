//! Request and response payloads for the four registry operations.
//!
//! Field names and shapes are kept stable so deployed clients can be
//! pointed at this server unchanged.

use serde::{Deserialize, Serialize};

use crate::resource::{Resource, TypeCode};

/// Acquire or renew a lease on `resource.key` for `ttl_in_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub resource: Resource,
    pub ttl_in_seconds: i64,
}

/// Release the lease on `resource.key` held by `resource.owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub resource: Resource,
}

/// Read the currently held lease for `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub resource: Resource,
}

/// List currently held leases, optionally filtered by type.
///
/// An absent `type_code` (with an empty legacy `type`) means "all held
/// leases". An explicit `UNKNOWN` code is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAllRequest {
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_code: Option<TypeCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAllResponse {
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_request_roundtrip() {
        let req = LockRequest {
            resource: Resource::new("k", "o", "v", TypeCode::Lock),
            ttl_in_seconds: 10,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: LockRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn fetch_all_request_distinguishes_absent_from_unknown() {
        let absent: FetchAllRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.type_code, None);

        let explicit: FetchAllRequest = serde_json::from_str(r#"{"type_code":0}"#).unwrap();
        assert_eq!(explicit.type_code, Some(TypeCode::Unknown));
    }

    #[test]
    fn fetch_all_request_accepts_legacy_type_string() {
        let req: FetchAllRequest = serde_json::from_str(r#"{"type":"presence"}"#).unwrap();
        assert_eq!(req.type_name, "presence");
        assert_eq!(req.type_code, None);
    }

    #[test]
    fn fetch_all_response_defaults_to_empty() {
        let resp: FetchAllResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.resources.is_empty());
    }
}
