//! Core types for the Latch lock and presence registry.
//!
//! A [`Resource`] names a lease request: a key, the claimant owner, an
//! opaque value for readers, and whether the lease is an exclusive lock or
//! an advisory presence. A [`Lock`] is the persisted image of a granted
//! lease, carrying the per-key `modified_index` fencing token.

pub mod lock;
pub mod messages;
pub mod resource;

pub use lock::Lock;
pub use messages::{
    FetchAllRequest, FetchAllResponse, FetchRequest, FetchResponse, LockRequest, ReleaseRequest,
};
pub use resource::{LOCK_TYPE, PRESENCE_TYPE, Resource, TypeCode};
