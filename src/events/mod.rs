//! # Event System
//!
//! Broadcast-based lifecycle event bus. The orchestrator and monitor publish
//! fire-and-forget events; the recovery service and any number of external
//! observers subscribe independently. Delivery requires no acknowledgement and
//! publishing succeeds even with zero subscribers.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
