//! Server side of the Latch lock and presence registry.
//!
//! The [`handler::LockHandler`] validates requests, drives the lock store,
//! hands fresh leases to the expiration scheduler, meters every call, and
//! escalates unrecoverable storage faults through a single-slot exit
//! channel. The [`api`] module exposes the handler over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod reporter;
pub mod store_factory;
pub mod tls;
