//! The host page seen through the engine's eyes.
//!
//! The engine never touches a real DOM. Everything it needs from the page it
//! asks through [`HostPage`]: selector queries, reading and writing the chat
//! field, listener registration, and the overlay element it owns.
//!
//! Implementations live outside this crate (a wasm bridge in the extension,
//! [`crate::testing::MemoryHost`] in tests).

use std::fmt;
use std::rc::Rc;

use tokio::time::Instant;

/// Opaque handle to an element of the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el#{}", self.0)
    }
}

/// Opaque handle to a registered host listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Host events the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Input,
    KeyUp,
    KeyDown,
    MouseDown,
    MouseUp,
    MouseEnter,
    Click,
    Resize,
}

impl EventKind {
    /// The DOM event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Input => "input",
            EventKind::KeyUp => "keyup",
            EventKind::KeyDown => "keydown",
            EventKind::MouseDown => "mousedown",
            EventKind::MouseUp => "mouseup",
            EventKind::MouseEnter => "mouseenter",
            EventKind::Click => "click",
            EventKind::Resize => "resize",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host event as delivered to engine listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub kind: EventKind,
    pub target: ElementId,
    /// Key name for keyboard events ("Backspace", "a", ...).
    pub key: Option<String>,
    /// Pointer position for mouse events, in page pixels.
    pub position: Option<(f64, f64)>,
    pub timestamp: Instant,
}

impl DomEvent {
    pub fn new(kind: EventKind, target: ElementId) -> Self {
        Self {
            kind,
            target,
            key: None,
            position: None,
            timestamp: Instant::now(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some((x, y));
        self
    }

    /// True for keys that delete content.
    pub fn is_delete_key(&self) -> bool {
        matches!(self.key.as_deref(), Some("Backspace") | Some("Delete"))
    }
}

/// Listener callback registered with the host.
pub type Listener = Rc<dyn Fn(&DomEvent)>;

/// Current content of an input-like element.
///
/// Chat sites use either plain value-bearing fields (`<textarea>`) or rich
/// content-editable editors. Both are read through this one type so the rest
/// of the engine does not care which one it is watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldContent {
    /// A value-bearing field; the raw `value`.
    Value(String),
    /// A content-editable element; its rendered text.
    Editable { text: String },
}

impl FieldContent {
    pub fn text(&self) -> &str {
        match self {
            FieldContent::Value(value) => value,
            FieldContent::Editable { text } => text,
        }
    }

    /// True when the field holds nothing but whitespace or the zero-width
    /// placeholders rich editors leave behind.
    pub fn is_blank(&self) -> bool {
        self.text().chars().all(|c| {
            c.is_whitespace() || matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}')
        })
    }
}

/// Everything the engine needs from the host page.
///
/// All methods are synchronous and infallible from the engine's point of
/// view: a missing element is `None`, an operation on a detached element is
/// a no-op.
pub trait HostPage {
    /// The document root; target for page-level listeners (resize, mouseup).
    fn document(&self) -> ElementId;

    /// First element matching `selector`.
    fn query_selector(&self, selector: &str) -> Option<ElementId>;

    /// Whether the element is still attached to the page.
    fn is_connected(&self, element: ElementId) -> bool;

    /// Read the field content; `None` when the element is not input-like.
    fn read_field(&self, element: ElementId) -> Option<FieldContent>;

    /// Replace the field content without firing input events.
    fn write_field(&self, element: ElementId, text: &str);

    fn add_listener(&self, target: ElementId, kind: EventKind, listener: Listener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    /// Create a new element tagged with `role`, attached to the page body.
    fn create_element(&self, role: &str) -> ElementId;

    /// All attached elements tagged with `role`, in document order.
    fn elements_with_role(&self, role: &str) -> Vec<ElementId>;

    fn remove_element(&self, element: ElementId);

    /// Replace the text content of an element.
    fn set_text(&self, element: ElementId, text: &str);

    fn add_class(&self, element: ElementId, class: &str);

    fn remove_class(&self, element: ElementId, class: &str);
}

/// Read the element's text, or `None` if it is missing or not input-like.
pub fn read_text(host: &dyn HostPage, element: ElementId) -> Option<FieldContent> {
    if !host.is_connected(element) {
        return None;
    }
    host.read_field(element)
}
