//! Handler traits for page lifecycle and custom events.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use pagesync_core::HandlerError;
use serde_json::Value;

use crate::page::PageHandle;
use crate::relay::CommitRelay;
use crate::session::Session;

pub type HandlerResult = Result<(), HandlerError>;

/// Arguments passed to `enter`, `update` and `leave` handlers.
pub struct LifecycleContext {
    /// Route payload sent by the client for this page.
    pub payload: Value,
    /// Commit capability bound to this session and page.
    pub page: PageHandle,
    pub session: Arc<Session>,
    /// Root-level commits (broadcast or explicit target).
    pub relay: CommitRelay,
    /// `true` when `enter` runs for a page a previous `keep` leave left retained.
    pub retained: bool,
}

/// Arguments passed to a custom-event handler.
pub struct EventContext {
    pub event: String,
    /// Event data sent by the client.
    pub data: Value,
    /// Route payload of the page the event was raised on.
    pub payload: Value,
    pub page: PageHandle,
    pub session: Arc<Session>,
    pub relay: CommitRelay,
}

/// Handler for one lifecycle transition of a page.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn handle(&self, ctx: LifecycleContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> LifecycleHandler for F
where
    F: Fn(LifecycleContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, ctx: LifecycleContext) -> HandlerResult {
        (self)(ctx).await
    }
}

/// Handler for a named custom event of a page.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: EventContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(EventContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, ctx: EventContext) -> HandlerResult {
        (self)(ctx).await
    }
}

/// Await a handler future, converting a panic into [`HandlerError::Panicked`].
pub(crate) async fn guarded<T, F>(fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn guarded_passes_through_results() {
        assert_eq!(guarded(async { Ok::<_, HandlerError>(7) }).await.unwrap(), 7);
        assert_matches!(
            guarded(async { Err::<(), _>(HandlerError::failed("nope")) }).await,
            Err(HandlerError::Failed(msg)) if msg == "nope"
        );
    }

    async fn explode() -> HandlerResult {
        panic!("kaboom")
    }

    async fn explode_at(n: usize) -> HandlerResult {
        panic!("bad index {n}")
    }

    #[tokio::test]
    async fn guarded_catches_panics() {
        let result = guarded(explode()).await;
        assert_matches!(result, Err(HandlerError::Panicked(msg)) if msg == "kaboom");
    }

    #[tokio::test]
    async fn guarded_catches_formatted_panics() {
        let result = guarded(explode_at(3)).await;
        assert_matches!(result, Err(HandlerError::Panicked(msg)) if msg == "bad index 3");
    }
}
