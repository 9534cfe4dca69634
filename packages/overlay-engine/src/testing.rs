//! Test doubles for driving the engine without a browser.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature (always on for
//! the crate's own tests):
//!
//! ```toml
//! [dev-dependencies]
//! overlay-engine = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use overlay_engine::testing::{run_local, MemoryHost, MemoryStore, ScriptedBackend};
//!
//! #[tokio::test(start_paused = true)]
//! async fn typing_reaches_typing_stopped() {
//!     run_local(async {
//!         let host = Rc::new(MemoryHost::new());
//!         let input = host.add_text_area("#prompt-textarea");
//!         host.add_button("#prompt-overlay-button");
//!         let engine = Orchestrator::new(
//!             EngineConfig::default(),
//!             host.clone(),
//!             Rc::new(MemoryStore::new()),
//!             Rc::new(ScriptedBackend::new()),
//!         )
//!         .unwrap();
//!         engine.init(HostConfig::new("test", "#prompt-textarea")).await.unwrap();
//!
//!         host.type_text(input, "hello");
//!         tokio::time::sleep(Duration::from_millis(1001)).await;
//!         assert_eq!(engine.state().as_deref(), Some("typingStopped"));
//!     }).await;
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::LocalSet;

use crate::backend::{AnalysisBackend, QaPair};
use crate::error::{EngineError, Result};
use crate::host::{DomEvent, ElementId, EventKind, FieldContent, HostPage, Listener, ListenerId};
use crate::notification::{Notification, NotificationId, NotificationPresenter};
use crate::quality::QualityMetrics;
use crate::storage::KeyValueStore;

/// Run `future` inside a fresh [`LocalSet`] so engine timers can spawn.
pub async fn run_local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

// =============================================================================
// RecordingPresenter
// =============================================================================

/// Presenter that records every show/hide call.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    shown: RefCell<Vec<Notification>>,
    hidden: RefCell<Vec<NotificationId>>,
    visible: RefCell<Vec<NotificationId>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The notification currently on screen, if exactly one is.
    pub fn visible(&self) -> Option<NotificationId> {
        self.visible.borrow().first().cloned()
    }

    /// How many notifications are on screen. Must never exceed one.
    pub fn visible_count(&self) -> usize {
        self.visible.borrow().len()
    }

    /// Ids passed to `show`, in call order.
    pub fn shown(&self) -> Vec<NotificationId> {
        self.shown.borrow().iter().map(|n| n.id.clone()).collect()
    }

    /// Ids passed to `hide`, in call order.
    pub fn hidden(&self) -> Vec<NotificationId> {
        self.hidden.borrow().clone()
    }

    /// Most recent notification passed to `show`.
    pub fn last_shown(&self) -> Option<Notification> {
        self.shown.borrow().last().cloned()
    }
}

impl NotificationPresenter for RecordingPresenter {
    fn show(&self, notification: &Notification) {
        self.shown.borrow_mut().push(notification.clone());
        let mut visible = self.visible.borrow_mut();
        if !visible.contains(&notification.id) {
            visible.push(notification.id.clone());
        }
    }

    fn hide(&self, id: &NotificationId) {
        self.hidden.borrow_mut().push(id.clone());
        self.visible.borrow_mut().retain(|v| v != id);
    }
}

// =============================================================================
// MemoryHost
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Value,
    Editable,
}

#[derive(Debug, Default)]
struct Node {
    selector: Option<String>,
    role: Option<String>,
    field: Option<FieldKind>,
    text: String,
    classes: BTreeSet<String>,
    connected: bool,
}

/// In-memory host page.
///
/// Element ids increase with creation order, which doubles as document
/// order. Listeners are called synchronously from [`MemoryHost::dispatch`].
pub struct MemoryHost {
    document: ElementId,
    nodes: RefCell<BTreeMap<ElementId, Node>>,
    listeners: RefCell<BTreeMap<ListenerId, (ElementId, EventKind, Listener)>>,
    next_id: Cell<u64>,
}

impl MemoryHost {
    pub fn new() -> Self {
        let document = ElementId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            document,
            Node {
                connected: true,
                ..Node::default()
            },
        );
        Self {
            document,
            nodes: RefCell::new(nodes),
            listeners: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
        }
    }

    fn alloc(&self, node: Node) -> ElementId {
        let id = ElementId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.nodes.borrow_mut().insert(id, node);
        id
    }

    fn add_node(&self, selector: &str, field: Option<FieldKind>) -> ElementId {
        self.alloc(Node {
            selector: Some(selector.to_string()),
            field,
            connected: true,
            ..Node::default()
        })
    }

    /// A `<textarea>`-like field matched by `selector`.
    pub fn add_text_area(&self, selector: &str) -> ElementId {
        self.add_node(selector, Some(FieldKind::Value))
    }

    /// A content-editable editor matched by `selector`.
    pub fn add_rich_editor(&self, selector: &str) -> ElementId {
        self.add_node(selector, Some(FieldKind::Editable))
    }

    /// A plain element (the widget button) matched by `selector`.
    pub fn add_button(&self, selector: &str) -> ElementId {
        self.add_node(selector, None)
    }

    /// Change the field content without firing any event.
    pub fn set_field(&self, element: ElementId, text: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&element) {
            node.text = text.to_string();
        }
    }

    /// Set the content and fire `input` then `keyup`, as a keystroke would.
    pub fn type_text(&self, element: ElementId, text: &str) {
        self.set_field(element, text);
        self.dispatch(DomEvent::new(EventKind::Input, element));
        self.dispatch(DomEvent::new(EventKind::KeyUp, element));
    }

    /// Fire `keydown` for `key`.
    pub fn press_key(&self, element: ElementId, key: &str) {
        self.dispatch(DomEvent::new(EventKind::KeyDown, element).with_key(key));
    }

    /// Backspace that empties the field. The content changes after the
    /// keydown, and no `input` event follows.
    pub fn clear_with_backspace(&self, element: ElementId) {
        self.press_key(element, "Backspace");
        self.set_field(element, "");
    }

    /// Press on `element` at `(x, y)`.
    pub fn mouse_down(&self, element: ElementId, x: f64, y: f64) {
        self.dispatch(DomEvent::new(EventKind::MouseDown, element).with_position(x, y));
    }

    /// Release anywhere on the page at `(x, y)`.
    pub fn mouse_up(&self, x: f64, y: f64) {
        self.dispatch(DomEvent::new(EventKind::MouseUp, self.document).with_position(x, y));
    }

    /// Fire `click` on `element`. Browsers send it after a pointer release
    /// on the same element, or alone for keyboard activation.
    pub fn click(&self, element: ElementId) {
        self.dispatch(DomEvent::new(EventKind::Click, element));
    }

    pub fn hover(&self, element: ElementId) {
        self.dispatch(DomEvent::new(EventKind::MouseEnter, element));
    }

    pub fn resize(&self) {
        self.dispatch(DomEvent::new(EventKind::Resize, self.document));
    }

    /// Deliver `event` to every listener registered for its target and kind.
    pub fn dispatch(&self, event: DomEvent) {
        let matching: Vec<Listener> = self
            .listeners
            .borrow()
            .values()
            .filter(|(target, kind, _)| *target == event.target && *kind == event.kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in matching {
            listener(&event);
        }
    }

    /// Detach an element from the page, as a site re-render would.
    pub fn detach(&self, element: ElementId) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&element) {
            node.connected = false;
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Listeners registered on `element`.
    pub fn listeners_on(&self, element: ElementId) -> usize {
        self.listeners
            .borrow()
            .values()
            .filter(|(target, _, _)| *target == element)
            .count()
    }

    pub fn text_of(&self, element: ElementId) -> Option<String> {
        self.nodes.borrow().get(&element).map(|n| n.text.clone())
    }

    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.nodes
            .borrow()
            .get(&element)
            .is_some_and(|n| n.classes.contains(class))
    }

    /// Classes of `element`, sorted.
    pub fn classes(&self, element: ElementId) -> Vec<String> {
        self.nodes
            .borrow()
            .get(&element)
            .map(|n| n.classes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPage for MemoryHost {
    fn document(&self) -> ElementId {
        self.document
    }

    fn query_selector(&self, selector: &str) -> Option<ElementId> {
        self.nodes
            .borrow()
            .iter()
            .find(|(_, n)| n.connected && n.selector.as_deref() == Some(selector))
            .map(|(id, _)| *id)
    }

    fn is_connected(&self, element: ElementId) -> bool {
        self.nodes.borrow().get(&element).is_some_and(|n| n.connected)
    }

    fn read_field(&self, element: ElementId) -> Option<FieldContent> {
        let nodes = self.nodes.borrow();
        let node = nodes.get(&element)?;
        match node.field? {
            FieldKind::Value => Some(FieldContent::Value(node.text.clone())),
            FieldKind::Editable => Some(FieldContent::Editable {
                text: node.text.clone(),
            }),
        }
    }

    fn write_field(&self, element: ElementId, text: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&element) {
            if node.field.is_some() {
                node.text = text.to_string();
            }
        }
    }

    fn add_listener(&self, target: ElementId, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().insert(id, (target, kind, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(&id);
    }

    fn create_element(&self, role: &str) -> ElementId {
        self.alloc(Node {
            role: Some(role.to_string()),
            connected: true,
            ..Node::default()
        })
    }

    fn elements_with_role(&self, role: &str) -> Vec<ElementId> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(_, n)| n.connected && n.role.as_deref() == Some(role))
            .map(|(id, _)| *id)
            .collect()
    }

    fn remove_element(&self, element: ElementId) {
        self.nodes.borrow_mut().remove(&element);
    }

    fn set_text(&self, element: ElementId, text: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&element) {
            node.text = text.to_string();
        }
    }

    fn add_class(&self, element: ElementId, class: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&element) {
            node.classes.insert(class.to_string());
        }
    }

    fn remove_class(&self, element: ElementId, class: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&element) {
            node.classes.remove(class);
        }
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, Value>>,
    fail_next: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `entries`.
    pub fn with<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::new();
        store
            .values
            .borrow_mut()
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v)));
        store
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    /// Make the next `get` or `set` fail.
    pub fn fail_next(&self) {
        self.fail_next.set(true);
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_next.replace(false) {
            return Err(EngineError::Storage("scripted storage failure".into()));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        self.check_failure()?;
        let values = self.values.borrow();
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, record: HashMap<String, Value>) -> Result<()> {
        self.check_failure()?;
        self.values.borrow_mut().extend(record);
        Ok(())
    }
}

// =============================================================================
// ScriptedBackend
// =============================================================================

/// Analysis backend with canned answers and optional latency.
///
/// Every call is recorded as `"<method>:<prompt>"`.
#[derive(Debug)]
pub struct ScriptedBackend {
    suggestions: RefCell<Option<Vec<String>>>,
    refined: RefCell<Option<String>>,
    quality: RefCell<Option<QualityMetrics>>,
    latency: Cell<Duration>,
    calls: RefCell<Vec<String>>,
    tokens: RefCell<Vec<Option<String>>>,
}

impl ScriptedBackend {
    /// Succeeds everywhere: two suggestions, an echoing refine, and
    /// mid-range quality.
    pub fn new() -> Self {
        Self {
            suggestions: RefCell::new(Some(vec![
                "Name your audience.".to_string(),
                "Ask for a specific format.".to_string(),
            ])),
            refined: RefCell::new(Some("Refined prompt".to_string())),
            quality: RefCell::new(Some(QualityMetrics::new(0.8, 0.6, 0.75, 0.55))),
            latency: Cell::new(Duration::ZERO),
            calls: RefCell::new(Vec::new()),
            tokens: RefCell::new(Vec::new()),
        }
    }

    pub fn set_suggestions(&self, suggestions: Vec<String>) {
        *self.suggestions.borrow_mut() = Some(suggestions);
    }

    pub fn fail_suggestions(&self) {
        *self.suggestions.borrow_mut() = None;
    }

    pub fn set_refined(&self, text: impl Into<String>) {
        *self.refined.borrow_mut() = Some(text.into());
    }

    pub fn fail_refine(&self) {
        *self.refined.borrow_mut() = None;
    }

    pub fn set_quality(&self, metrics: QualityMetrics) {
        *self.quality.borrow_mut() = Some(metrics);
    }

    pub fn fail_quality(&self) {
        *self.quality.borrow_mut() = None;
    }

    /// Delay every answer by `latency` of (virtual) time.
    pub fn set_latency(&self, latency: Duration) {
        self.latency.set(latency);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Token passed with each call, in call order.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.borrow().clone()
    }

    async fn record(&self, method: &str, prompt: &str, token: Option<&str>) {
        self.calls.borrow_mut().push(format!("{}:{}", method, prompt));
        self.tokens.borrow_mut().push(token.map(str::to_string));
        let latency = self.latency.get();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn scripted_failure(method: &str) -> EngineError {
    EngineError::Backend(format!("scripted {} failure", method))
}

#[async_trait(?Send)]
impl AnalysisBackend for ScriptedBackend {
    async fn suggestions(&self, prompt: &str, token: Option<&str>) -> Result<Vec<String>> {
        self.record("suggestions", prompt, token).await;
        self.suggestions
            .borrow()
            .clone()
            .ok_or_else(|| scripted_failure("suggestions"))
    }

    async fn refine(
        &self,
        prompt: &str,
        _answers: &[QaPair],
        token: Option<&str>,
    ) -> Result<String> {
        self.record("refine", prompt, token).await;
        self.refined
            .borrow()
            .clone()
            .ok_or_else(|| scripted_failure("refine"))
    }

    async fn quality(&self, prompt: &str, token: Option<&str>) -> Result<QualityMetrics> {
        self.record("quality", prompt, token).await;
        (*self.quality.borrow()).ok_or_else(|| scripted_failure("quality"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_memory_host_queries_skip_detached_nodes() {
        let host = MemoryHost::new();
        let old = host.add_text_area("#prompt-textarea");
        host.detach(old);
        let fresh = host.add_text_area("#prompt-textarea");

        assert_eq!(host.query_selector("#prompt-textarea"), Some(fresh));
        assert!(!host.is_connected(old));
        assert!(host.is_connected(host.document()));
    }

    #[test]
    fn test_dispatch_reaches_only_matching_listeners() {
        let host = MemoryHost::new();
        let input = host.add_text_area("#a");
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let listener: Listener = Rc::new(move |_| counter.set(counter.get() + 1));
        host.add_listener(input, EventKind::Input, listener);

        host.type_text(input, "x");
        host.dispatch(DomEvent::new(EventKind::Input, host.document()));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_field_kinds_read_back() {
        let host = MemoryHost::new();
        let plain = host.add_text_area("#plain");
        let rich = host.add_rich_editor("#rich");
        let button = host.add_button("#button");
        host.set_field(plain, "a");
        host.set_field(rich, "b");

        assert_eq!(host.read_field(plain), Some(FieldContent::Value("a".into())));
        assert_eq!(host.read_field(rich), Some(FieldContent::Editable { text: "b".into() }));
        assert_eq!(host.read_field(button), None);
    }

    #[test]
    fn test_recording_presenter_tracks_visibility() {
        let presenter = RecordingPresenter::new();
        let n = Notification::new("a", crate::Priority::Low, "hi");
        presenter.show(&n);
        presenter.show(&n);
        assert_eq!(presenter.visible_count(), 1);
        presenter.hide(&n.id);
        assert_eq!(presenter.visible(), None);
        assert_eq!(presenter.shown().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_backend_latency_and_failure() {
        let backend = ScriptedBackend::new();
        backend.set_latency(Duration::from_millis(300));
        let start = tokio::time::Instant::now();
        assert!(backend.quality("p", Some("tok")).await.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(300));

        backend.fail_quality();
        assert!(backend.quality("p", None).await.is_err());
        assert_eq!(backend.calls(), vec!["quality:p", "quality:p"]);
        assert_eq!(backend.tokens(), vec![Some("tok".to_string()), None]);
    }
}
