//! Page handler bundles and the page-name registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::{EventHandler, LifecycleHandler};

/// Names a custom event may not use because they address lifecycle slots.
pub const RESERVED_EVENT_NAMES: [&str; 5] = ["enter", "update", "leave", "name", "keep"];

/// A page bundle failed validation at build time.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("page name must not be empty")]
    EmptyPageName,

    #[error("page '{page}': event name must not be empty")]
    EmptyEventName { page: String },

    #[error("page '{page}': event name '{event}' is reserved")]
    ReservedEventName { page: String, event: String },

    #[error("page '{page}': event '{event}' registered twice")]
    DuplicateEvent { page: String, event: String },
}

/// Server-side behavior of one page: lifecycle callbacks, custom events and
/// the retention flag.
pub struct PageBundle {
    name: String,
    enter: Option<Arc<dyn LifecycleHandler>>,
    update: Option<Arc<dyn LifecycleHandler>>,
    leave: Option<Arc<dyn LifecycleHandler>>,
    events: HashMap<String, Arc<dyn EventHandler>>,
    keep: bool,
}

impl PageBundle {
    pub fn builder(name: impl Into<String>) -> PageBundleBuilder {
        PageBundleBuilder {
            name: name.into(),
            enter: None,
            update: None,
            leave: None,
            events: Vec::new(),
            keep: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// When `true`, leaving the page does not tell the client to discard it.
    pub fn keep(&self) -> bool {
        self.keep
    }

    pub fn enter(&self) -> Option<&Arc<dyn LifecycleHandler>> {
        self.enter.as_ref()
    }

    pub fn update(&self) -> Option<&Arc<dyn LifecycleHandler>> {
        self.update.as_ref()
    }

    pub fn leave(&self) -> Option<&Arc<dyn LifecycleHandler>> {
        self.leave.as_ref()
    }

    pub fn event(&self, name: &str) -> Option<&Arc<dyn EventHandler>> {
        self.events.get(name)
    }

    /// Registered custom event names (sorted).
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for PageBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBundle")
            .field("name", &self.name)
            .field("enter", &self.enter.is_some())
            .field("update", &self.update.is_some())
            .field("leave", &self.leave.is_some())
            .field("events", &self.event_names())
            .field("keep", &self.keep)
            .finish()
    }
}

/// Builder for [`PageBundle`]; validation happens in [`build`](Self::build).
pub struct PageBundleBuilder {
    name: String,
    enter: Option<Arc<dyn LifecycleHandler>>,
    update: Option<Arc<dyn LifecycleHandler>>,
    leave: Option<Arc<dyn LifecycleHandler>>,
    events: Vec<(String, Arc<dyn EventHandler>)>,
    keep: bool,
}

impl PageBundleBuilder {
    pub fn on_enter(mut self, handler: impl LifecycleHandler + 'static) -> Self {
        self.enter = Some(Arc::new(handler));
        self
    }

    pub fn on_update(mut self, handler: impl LifecycleHandler + 'static) -> Self {
        self.update = Some(Arc::new(handler));
        self
    }

    pub fn on_leave(mut self, handler: impl LifecycleHandler + 'static) -> Self {
        self.leave = Some(Arc::new(handler));
        self
    }

    pub fn on_event(mut self, event: impl Into<String>, handler: impl EventHandler + 'static) -> Self {
        self.events.push((event.into(), Arc::new(handler)));
        self
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    pub fn build(self) -> Result<PageBundle, RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::EmptyPageName);
        }
        let mut events = HashMap::with_capacity(self.events.len());
        for (event, handler) in self.events {
            if event.is_empty() {
                return Err(RegistryError::EmptyEventName { page: self.name });
            }
            if RESERVED_EVENT_NAMES.contains(&event.as_str()) {
                return Err(RegistryError::ReservedEventName {
                    page: self.name,
                    event,
                });
            }
            if events.contains_key(&event) {
                return Err(RegistryError::DuplicateEvent {
                    page: self.name,
                    event,
                });
            }
            let _ = events.insert(event, handler);
        }
        Ok(PageBundle {
            name: self.name,
            enter: self.enter,
            update: self.update,
            leave: self.leave,
            events,
            keep: self.keep,
        })
    }
}

/// Mapping from page name to its bundle. Populated before traffic begins and
/// read by every session's dispatcher.
#[derive(Default)]
pub struct PageRegistry {
    pages: HashMap<String, PageBundle>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a bundle under its name. An existing bundle for that name is
    /// replaced outright and returned.
    pub fn register(&mut self, bundle: PageBundle) -> Option<PageBundle> {
        self.pages.insert(bundle.name.clone(), bundle)
    }

    /// Absence is a valid outcome: dispatch for an unknown page is a no-op.
    pub fn lookup(&self, name: &str) -> Option<&PageBundle> {
        self.pages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }

    /// Registered page names (sorted).
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pages.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EventContext, HandlerResult, LifecycleContext};
    use assert_matches::assert_matches;

    async fn noop(_ctx: LifecycleContext) -> HandlerResult {
        Ok(())
    }

    async fn noop_event(_ctx: EventContext) -> HandlerResult {
        Ok(())
    }

    #[test]
    fn build_minimal_bundle() {
        let bundle = PageBundle::builder("foo").build().unwrap();
        assert_eq!(bundle.name(), "foo");
        assert!(!bundle.keep());
        assert!(bundle.enter().is_none());
        assert!(bundle.update().is_none());
        assert!(bundle.leave().is_none());
        assert!(bundle.event_names().is_empty());
    }

    #[test]
    fn build_full_bundle() {
        let bundle = PageBundle::builder("foo")
            .on_enter(noop)
            .on_update(noop)
            .on_leave(noop)
            .on_event("like", noop_event)
            .on_event("share", noop_event)
            .keep(true)
            .build()
            .unwrap();
        assert!(bundle.keep());
        assert!(bundle.enter().is_some());
        assert!(bundle.update().is_some());
        assert!(bundle.leave().is_some());
        assert!(bundle.event("like").is_some());
        assert!(bundle.event("missing").is_none());
        assert_eq!(bundle.event_names(), vec!["like", "share"]);
    }

    #[test]
    fn empty_page_name_rejected() {
        assert_matches!(PageBundle::builder("").build(), Err(RegistryError::EmptyPageName));
    }

    #[test]
    fn reserved_event_names_rejected() {
        for reserved in RESERVED_EVENT_NAMES {
            let err = PageBundle::builder("foo").on_event(reserved, noop_event).build();
            assert_matches!(err, Err(RegistryError::ReservedEventName { event, .. }) if event == reserved);
        }
    }

    #[test]
    fn empty_and_duplicate_event_names_rejected() {
        assert_matches!(
            PageBundle::builder("foo").on_event("", noop_event).build(),
            Err(RegistryError::EmptyEventName { page }) if page == "foo"
        );
        assert_matches!(
            PageBundle::builder("foo")
                .on_event("like", noop_event)
                .on_event("like", noop_event)
                .build(),
            Err(RegistryError::DuplicateEvent { event, .. }) if event == "like"
        );
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = PageRegistry::new();
        assert!(reg.register(PageBundle::builder("foo").build().unwrap()).is_none());
        assert!(reg.contains("foo"));
        assert_eq!(reg.lookup("foo").unwrap().name(), "foo");
        assert!(reg.lookup("bar").is_none());
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn re_registering_replaces_last_write_wins() {
        let mut reg = PageRegistry::new();
        let _ = reg.register(PageBundle::builder("foo").on_enter(noop).build().unwrap());
        let replaced = reg
            .register(PageBundle::builder("foo").keep(true).build().unwrap())
            .unwrap();
        assert!(replaced.enter().is_some());

        let current = reg.lookup("foo").unwrap();
        assert!(current.keep());
        // Replacement does not merge the previous enter handler.
        assert!(current.enter().is_none());
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn names_sorted() {
        let mut reg = PageRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            let _ = reg.register(PageBundle::builder(name).build().unwrap());
        }
        assert_eq!(reg.names(), vec!["alpha", "mid", "zeta"]);
    }
}
