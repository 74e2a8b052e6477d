//! # pagesync-core
//!
//! Shared vocabulary for the pagesync protocol:
//!
//! - [`ids`]: session identity used as a unicast target
//! - [`messages`]: lifecycle/custom-event envelopes and the inbound/outbound message kinds
//! - [`codec`]: `[event, ...args]` JSON frame encoding
//! - [`errors`]: protocol and handler error types

pub mod codec;
pub mod errors;
pub mod ids;
pub mod messages;

pub use errors::{HandlerError, ProtocolError};
pub use ids::SessionId;
pub use messages::{ClientMessage, CustomEventEnvelope, LifecycleEnvelope, PageInfo, ServerMessage};
