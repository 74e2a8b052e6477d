//! Per-connection dispatch of auth, lifecycle and custom-event messages.
//!
//! One inbound message is one failure boundary: the first handler error or
//! panic aborts whatever is left of that message and the session receives a
//! single reset naming every page the message mentioned.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use pagesync_core::{
    ClientMessage, CustomEventEnvelope, HandlerError, LifecycleEnvelope, PageInfo, ServerMessage,
};
use tracing::{debug, instrument, warn};

use crate::engine::Engine;
use crate::handler::{guarded, EventContext, HandlerResult, LifecycleContext};
use crate::metrics::{DISPATCH_TOTAL, HANDLER_FAILURES_TOTAL, RESETS_TOTAL, UNAUTHORIZED_DROPPED_TOTAL};
use crate::page::PageHandle;
use crate::session::Session;

/// Client-visible state of one page within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
    Inactive,
    Active,
    /// Left with `keep = true`: the client still holds its state.
    Retained,
}

impl PageState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::Retained)
    }
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Auth handshake finished with the given result.
    Authenticated(bool),
    /// Page traffic from an unverified session; dropped without a reply.
    Unauthorized,
    /// All handlers (possibly none) completed.
    Dispatched,
    /// A handler failed; a reset for `pages` was sent.
    Reset {
        pages: Vec<String>,
        error: HandlerError,
    },
}

/// Dispatch state for one connection.
pub struct SessionDispatcher {
    engine: Arc<Engine>,
    session: Arc<Session>,
    pages: HashMap<String, PageState>,
}

impl SessionDispatcher {
    pub fn new(engine: Arc<Engine>, session: Arc<Session>) -> Self {
        Self {
            engine,
            session,
            pages: HashMap::new(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn page_state(&self, page: &str) -> PageState {
        self.pages.get(page).copied().unwrap_or(PageState::Inactive)
    }

    /// Pages currently Active or Retained (sorted).
    pub fn active_pages(&self) -> Vec<String> {
        let mut pages: Vec<String> = self
            .pages
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(name, _)| name.clone())
            .collect();
        pages.sort();
        pages
    }

    /// Process one inbound message to completion.
    #[instrument(skip_all, fields(session_id = %self.session.id(), event = message.event()))]
    pub async fn handle(&mut self, message: ClientMessage) -> DispatchOutcome {
        let (pages, result) = match message {
            ClientMessage::Auth(credentials) => {
                let engine = Arc::clone(&self.engine);
                let ok = engine
                    .auth_gate()
                    .evaluate(&self.session, credentials, engine.relay())
                    .await;
                return DispatchOutcome::Authenticated(ok);
            }
            _ if !self.engine.auth_gate().is_authorized(&self.session) => {
                debug!("dropping page traffic from unverified session");
                counter!(UNAUTHORIZED_DROPPED_TOTAL).increment(1);
                return DispatchOutcome::Unauthorized;
            }
            ClientMessage::PageSync(envelope) => {
                counter!(DISPATCH_TOTAL, "kind" => "lifecycle").increment(1);
                let pages = envelope.pages();
                (pages, self.run_lifecycle(envelope).await)
            }
            ClientMessage::PageEvent(event) => {
                counter!(DISPATCH_TOTAL, "kind" => "event").increment(1);
                let pages = event.pages();
                (pages, self.run_event(event).await)
            }
        };

        match result {
            Ok(()) => DispatchOutcome::Dispatched,
            Err(error) => self.reset_after_failure(pages, error),
        }
    }

    async fn run_lifecycle(&mut self, envelope: LifecycleEnvelope) -> HandlerResult {
        let LifecycleEnvelope {
            enter,
            leave,
            update,
        } = envelope;
        if let Some(info) = enter {
            self.enter(info).await?;
        }
        if let Some(info) = leave {
            self.leave(info).await?;
        }
        if let Some(info) = update {
            self.update(info).await?;
        }
        Ok(())
    }

    async fn enter(&mut self, info: PageInfo) -> HandlerResult {
        let engine = Arc::clone(&self.engine);
        let Some(bundle) = engine.registry().lookup(&info.page) else {
            debug!(page = %info.page, "enter for unregistered page");
            return Ok(());
        };
        let retained = self.page_state(&info.page) == PageState::Retained;
        let _ = self.pages.insert(info.page.clone(), PageState::Active);
        if let Some(handler) = bundle.enter() {
            debug!(page = %info.page, retained, "enter");
            let ctx = self.lifecycle_context(info, retained);
            guarded(handler.handle(ctx)).await?;
        }
        Ok(())
    }

    async fn leave(&mut self, info: PageInfo) -> HandlerResult {
        let engine = Arc::clone(&self.engine);
        let Some(bundle) = engine.registry().lookup(&info.page) else {
            debug!(page = %info.page, "leave for unregistered page");
            return Ok(());
        };
        let page = info.page.clone();
        if let Some(handler) = bundle.leave() {
            debug!(page = %page, "leave");
            let ctx = self.lifecycle_context(info, false);
            guarded(handler.handle(ctx)).await?;
        }
        if bundle.keep() {
            let _ = self.pages.insert(page, PageState::Retained);
        } else {
            let _ = self.pages.insert(page.clone(), PageState::Inactive);
            counter!(RESETS_TOTAL, "cause" => "leave").increment(1);
            let _ = engine
                .relay()
                .send(self.session.id(), &ServerMessage::reset(vec![page]));
        }
        Ok(())
    }

    async fn update(&mut self, info: PageInfo) -> HandlerResult {
        let engine = Arc::clone(&self.engine);
        let Some(handler) = engine
            .registry()
            .lookup(&info.page)
            .and_then(|bundle| bundle.update())
        else {
            return Ok(());
        };
        debug!(page = %info.page, "update");
        let ctx = self.lifecycle_context(info, false);
        guarded(handler.handle(ctx)).await
    }

    async fn run_event(&mut self, event: CustomEventEnvelope) -> HandlerResult {
        let engine = Arc::clone(&self.engine);
        let Some(handler) = engine
            .registry()
            .lookup(&event.page.page)
            .and_then(|bundle| bundle.event(&event.event))
        else {
            debug!(page = %event.page.page, event = %event.event, "no handler for custom event");
            return Ok(());
        };
        debug!(page = %event.page.page, event = %event.event, "custom event");
        let CustomEventEnvelope { event, page, data } = event;
        let ctx = EventContext {
            event,
            data,
            payload: page.payload,
            page: self.page_handle(page.page),
            session: Arc::clone(&self.session),
            relay: engine.relay().clone(),
        };
        guarded(handler.handle(ctx)).await
    }

    fn reset_after_failure(&mut self, pages: Vec<String>, error: HandlerError) -> DispatchOutcome {
        warn!(error = %error, ?pages, "page handler failed, resetting pages");
        counter!(HANDLER_FAILURES_TOTAL, "error_type" => error.error_kind()).increment(1);
        counter!(RESETS_TOTAL, "cause" => "failure").increment(1);
        for page in &pages {
            let _ = self.pages.insert(page.clone(), PageState::Inactive);
        }
        let _ = self
            .engine
            .relay()
            .send(self.session.id(), &ServerMessage::reset(pages.clone()));
        DispatchOutcome::Reset { pages, error }
    }

    fn lifecycle_context(&self, info: PageInfo, retained: bool) -> LifecycleContext {
        LifecycleContext {
            payload: info.payload,
            page: self.page_handle(info.page),
            session: Arc::clone(&self.session),
            relay: self.engine.relay().clone(),
            retained,
        }
    }

    fn page_handle(&self, page: String) -> PageHandle {
        PageHandle::new(self.session.id().clone(), page, self.engine.relay().clone())
    }
}
