//! # pagesync-engine
//!
//! Session/protocol engine that keeps server-held page state in sync with
//! client page views.
//!
//! - [`registry`]: one handler bundle per page name, validated at build time
//! - [`auth`]: ordered credential predicates and the per-session verified gate
//! - [`relay`]: unicast/broadcast commits over an [`Outbound`] transport
//! - [`dispatcher`]: per-connection lifecycle/event dispatch with reset-on-failure
//! - [`engine`]: the explicitly constructed engine instance tying them together

pub mod auth;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod metrics;
pub mod outbound;
pub mod page;
pub mod registry;
pub mod relay;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{AuthError, AuthGate, AuthPredicate};
pub use dispatcher::{DispatchOutcome, PageState, SessionDispatcher};
pub use engine::Engine;
pub use handler::{EventContext, EventHandler, HandlerResult, LifecycleContext, LifecycleHandler};
pub use outbound::Outbound;
pub use page::PageHandle;
pub use registry::{PageBundle, PageBundleBuilder, PageRegistry, RegistryError};
pub use relay::CommitRelay;
pub use session::Session;
