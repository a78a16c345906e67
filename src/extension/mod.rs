//! Extension API: graceful-shutdown coordination with the host.
//!
//! The host only sends SIGTERM ahead of SIGKILL to processes that have at
//! least one extension registered. Registering an internal extension that
//! subscribes to no events is enough to opt in.

pub mod client;
pub mod sigterm;

pub use client::{ExtensionClient, ExtensionId};
pub use sigterm::enable_sigterm;
