//! Overlay materialization on the host page.
//!
//! Several independent producers (hover, typed content, a remote push) can
//! try to materialize the overlay at the same time. Every creation path goes
//! through [`ensure_singleton`], which keeps exactly one node per role.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::coordinator::AnimationSurface;
use crate::host::{ElementId, HostPage};
use crate::notification::{Notification, NotificationId, NotificationPresenter, Priority};

/// Return the single element tagged `role`, creating it if needed.
///
/// Duplicates are a recoverable consistency bug: they are logged with their
/// count, the first node in document order is kept and the rest removed.
/// Idempotent.
pub fn ensure_singleton(host: &dyn HostPage, role: &str) -> ElementId {
    let existing = host.elements_with_role(role);
    match existing.split_first() {
        None => {
            let element = host.create_element(role);
            debug!(role, %element, "overlay node created");
            element
        }
        Some((first, rest)) => {
            if !rest.is_empty() {
                warn!(role, count = existing.len(), "duplicate overlay nodes found, keeping first");
                for duplicate in rest {
                    host.remove_element(*duplicate);
                }
            }
            *first
        }
    }
}

/// Remove every element tagged `role`. Returns how many were removed.
pub fn remove_all_with_role(host: &dyn HostPage, role: &str) -> usize {
    let existing = host.elements_with_role(role);
    for element in &existing {
        host.remove_element(*element);
    }
    existing.len()
}

/// Presents notifications as a single overlay element on the host page.
pub struct OverlayPresenter {
    host: Rc<dyn HostPage>,
    role: String,
    dark: Cell<bool>,
    showing: RefCell<Option<NotificationId>>,
}

impl OverlayPresenter {
    pub fn new(host: Rc<dyn HostPage>, role: impl Into<String>) -> Self {
        Self {
            host,
            role: role.into(),
            dark: Cell::new(false),
            showing: RefCell::new(None),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Theme flag applied to the overlay the next time it is shown.
    pub fn set_dark_mode(&self, dark: bool) {
        self.dark.set(dark);
    }

    /// Id of the notification currently rendered.
    pub fn showing(&self) -> Option<NotificationId> {
        self.showing.borrow().clone()
    }

    /// Remove the overlay regardless of which notification it shows.
    pub fn clear(&self) {
        remove_all_with_role(self.host.as_ref(), &self.role);
        *self.showing.borrow_mut() = None;
    }
}

impl NotificationPresenter for OverlayPresenter {
    fn show(&self, notification: &Notification) {
        let element = ensure_singleton(self.host.as_ref(), &self.role);
        self.host.set_text(element, &notification.content);
        for priority in Priority::DESCENDING {
            self.host.remove_class(element, &format!("priority-{}", priority));
        }
        self.host
            .add_class(element, &format!("priority-{}", notification.priority));
        if self.dark.get() {
            self.host.add_class(element, "dark");
        } else {
            self.host.remove_class(element, "dark");
        }
        *self.showing.borrow_mut() = Some(notification.id.clone());
    }

    fn hide(&self, id: &NotificationId) {
        let matches = self.showing.borrow().as_ref() == Some(id);
        if matches {
            self.clear();
        }
    }
}

/// Class decoration of the widget button.
///
/// Every class the decorator adds is remembered, so [`ButtonDecorator::detach`]
/// strips exactly what the engine put there and nothing the site owns.
pub struct ButtonDecorator {
    host: Rc<dyn HostPage>,
    button: Cell<Option<ElementId>>,
    dark: Cell<bool>,
    applied: RefCell<BTreeSet<String>>,
}

impl ButtonDecorator {
    pub fn new(host: Rc<dyn HostPage>) -> Self {
        Self {
            host,
            button: Cell::new(None),
            dark: Cell::new(false),
            applied: RefCell::new(BTreeSet::new()),
        }
    }

    /// Decorate `button` from now on.
    pub fn attach(&self, button: ElementId) {
        self.detach();
        self.button.set(Some(button));
        if self.dark.get() {
            self.add("dark");
        }
    }

    /// Strip every engine class and forget the button.
    pub fn detach(&self) {
        let applied = std::mem::take(&mut *self.applied.borrow_mut());
        if let Some(button) = self.button.take() {
            for class in &applied {
                self.host.remove_class(button, class);
            }
        }
    }

    pub fn button(&self) -> Option<ElementId> {
        self.button.get()
    }

    pub fn set_dark(&self, dark: bool) {
        self.dark.set(dark);
        if dark {
            self.add("dark");
        } else {
            self.remove("dark");
        }
    }

    pub fn enter_state(&self, state: &str) {
        self.add(&format!("state-{}", state));
    }

    pub fn exit_state(&self, state: &str) {
        self.remove(&format!("state-{}", state));
    }

    /// Engine classes currently on the button.
    pub fn applied(&self) -> Vec<String> {
        self.applied.borrow().iter().cloned().collect()
    }

    fn add(&self, class: &str) {
        if let Some(button) = self.button.get() {
            self.host.add_class(button, class);
            self.applied.borrow_mut().insert(class.to_string());
        }
    }

    fn remove(&self, class: &str) {
        if let Some(button) = self.button.get() {
            self.host.remove_class(button, class);
        }
        self.applied.borrow_mut().remove(class);
    }

    fn strip_animations(&self) {
        let animations: Vec<String> = self
            .applied
            .borrow()
            .iter()
            .filter(|c| c.starts_with("animate-"))
            .cloned()
            .collect();
        for class in animations {
            self.remove(&class);
        }
    }
}

impl AnimationSurface for ButtonDecorator {
    fn play(&self, state: &str) {
        self.strip_animations();
        self.add(&format!("animate-{}", state));
    }

    fn clear(&self) {
        self.strip_animations();
    }
}
