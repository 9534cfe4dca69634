//! Element discovery, listener wiring and session teardown.

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::host::{DomEvent, ElementId, EventKind};
use crate::states::{self, StatePayload};
use crate::timer;
use crate::watcher::InputActivityWatcher;

use super::{InitStatus, OrchestratorInner};

/// Where and when the button was pressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Press {
    pub at: Instant,
    pub position: Option<(f64, f64)>,
}

/// Everything bound to one pair of discovered elements.
pub(super) struct WatchSession {
    /// Correlates log lines of one attachment.
    pub id: Uuid,
    pub input: ElementId,
    pub button: ElementId,
    pub watcher: InputActivityWatcher,
    /// Hash of the last content sent for analysis or injected.
    pub last_content_hash: Cell<Option<u64>>,
}

/// Hash of the prompt text, ignoring surrounding whitespace.
pub(super) fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.trim().hash(&mut hasher);
    hasher.finish()
}

type Handler = fn(&OrchestratorInner, &DomEvent);

impl OrchestratorInner {
    pub(super) fn watcher(&self) -> Option<InputActivityWatcher> {
        self.session.borrow().as_ref().map(|s| s.watcher.clone())
    }

    /// Find input and button, wire listeners and start watching.
    /// Returns false if either element is missing.
    pub(super) fn try_attach(&self) -> bool {
        let selectors = self
            .host_config
            .borrow()
            .as_ref()
            .map(|c| (c.text_area_selector.clone(), c.button_selector.clone()));
        let Some((input_selector, button_selector)) = selectors else {
            return false;
        };

        let Some(input) = self.host.query_selector(&input_selector) else {
            debug!(selector = %input_selector, "chat input not found");
            return false;
        };
        let Some(button) = self.host.query_selector(&button_selector) else {
            debug!(selector = %button_selector, "widget button not found");
            return false;
        };

        let epoch = self.bump_epoch();
        let weak = self.weak_self.clone();
        let watcher = InputActivityWatcher::new(
            self.host.clone(),
            input,
            self.config.typing_timeout(),
            self.config.poll_interval(),
            move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_activity(event, epoch);
                }
            },
        );

        let document = self.host.document();
        self.listen(input, EventKind::Input, Self::on_input);
        self.listen(input, EventKind::KeyUp, Self::on_input);
        self.listen(input, EventKind::KeyDown, Self::on_key_down);
        self.listen(button, EventKind::MouseDown, Self::on_press);
        self.listen(document, EventKind::MouseUp, Self::on_release);
        self.listen(button, EventKind::MouseEnter, Self::on_hover);
        self.listen(button, EventKind::Click, Self::on_click);

        let weak = self.weak_self.clone();
        self.bus.on_debounced(
            document,
            EventKind::Resize,
            self.config.resize_debounce(),
            move |_| {
                if let Some(inner) = weak.upgrade() {
                    if !inner.disabled.get() {
                        inner.on_resize();
                    }
                }
            },
        );

        let id = Uuid::new_v4();
        *self.session.borrow_mut() = Some(WatchSession {
            id,
            input,
            button,
            watcher: watcher.clone(),
            last_content_hash: Cell::new(None),
        });
        self.decorator.attach(button);
        watcher.start();

        if let Err(e) = self.request(states::IDLE, StatePayload::None) {
            warn!(error = %e, "initial idle transition failed");
        }
        info!(session = %id, %input, %button, "overlay attached");
        true
    }

    fn listen(&self, target: ElementId, kind: EventKind, handler: Handler) {
        let weak = self.weak_self.clone();
        self.bus.on(target, kind, move |event| {
            if let Some(inner) = weak.upgrade() {
                if !inner.disabled.get() {
                    handler(&inner, event);
                }
            }
        });
    }

    /// Detach listeners, stop the watcher and abort in-flight calls.
    pub(super) fn teardown_session(&self) {
        self.bump_epoch();
        self.bus.off_all();
        let session = self.session.borrow_mut().take();
        if let Some(session) = session {
            session.watcher.dispose();
            debug!(session = %session.id, "session torn down");
        }
        self.tasks.borrow_mut().abort_all();
        self.press.set(None);
        self.last_release.set(None);
        self.decorator.detach();
    }

    /// Retry discovery every `discovery_retry_ms` until attached or out of
    /// attempts.
    pub(super) fn schedule_discovery(&self) {
        self.discovery_attempts.set(0);
        let weak = self.weak_self.clone();
        let timer = timer::spawn_interval(self.config.discovery_retry(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.discovery_tick();
            }
        });
        *self.discovery.borrow_mut() = Some(timer);
        debug!(
            retry_ms = self.config.discovery_retry_ms,
            max_attempts = self.config.discovery_max_attempts,
            "element discovery scheduled"
        );
    }

    fn discovery_tick(&self) {
        if self.disabled.get() {
            self.discovery.borrow_mut().take();
            return;
        }
        let attempt = self.discovery_attempts.get() + 1;
        self.discovery_attempts.set(attempt);

        if self.try_attach() {
            self.discovery.borrow_mut().take();
            info!(attempt, "elements discovered");
            if self.reinit_pending.replace(false) {
                self.coordinator.handle_reinitialization(StatePayload::None);
            }
            return;
        }

        if attempt >= self.config.discovery_max_attempts {
            warn!(attempts = attempt, "chat input never appeared, giving up");
            self.discovery.borrow_mut().take();
        }
    }

    pub(super) fn reinitialize(&self) -> InitStatus {
        self.discovery.borrow_mut().take();
        self.teardown_session();
        if self.try_attach() {
            self.coordinator.handle_reinitialization(StatePayload::None);
            InitStatus::Attached
        } else {
            self.reinit_pending.set(true);
            self.schedule_discovery();
            InitStatus::Pending
        }
    }

    fn on_resize(&self) {
        let detached = match self.session.borrow().as_ref() {
            Some(s) => !self.host.is_connected(s.input) || !self.host.is_connected(s.button),
            None => return,
        };
        if detached {
            info!("watched elements detached, reinitializing");
            self.reinitialize();
        } else {
            debug!("resize settled, elements still attached");
        }
    }

    fn on_input(&self, _event: &DomEvent) {
        if let Some(watcher) = self.watcher() {
            watcher.handle_input();
        }
    }

    fn on_key_down(&self, event: &DomEvent) {
        if !event.is_delete_key() {
            return;
        }
        if let Some(watcher) = self.watcher() {
            watcher.schedule_recheck(self.config.delete_check_delay());
        }
    }

    fn on_press(&self, event: &DomEvent) {
        self.press.set(Some(Press {
            at: event.timestamp,
            position: event.position,
        }));
    }

    fn on_release(&self, event: &DomEvent) {
        let Some(press) = self.press.take() else {
            return;
        };
        self.last_release.set(Some(event.timestamp));
        if self.is_drag(&press, event) {
            debug!("button drag ignored");
            return;
        }
        self.activate();
    }

    /// A long press that travelled beyond the tolerance is a drag.
    pub(super) fn is_drag(&self, press: &Press, release: &DomEvent) -> bool {
        let held = release.timestamp.saturating_duration_since(press.at);
        let distance = match (press.position, release.position) {
            (Some((x0, y0)), Some((x1, y1))) => (x1 - x0).hypot(y1 - y0),
            _ => 0.0,
        };
        held > self.config.drag_threshold() && distance > self.config.drag_tolerance_px
    }

    fn on_hover(&self, _event: &DomEvent) {
        self.show_breakdown();
    }

    /// Keyboard activation. A click trailing a pointer release was already
    /// decided by the press/release pair.
    fn on_click(&self, event: &DomEvent) {
        if let Some(released) = self.last_release.take() {
            let since = event.timestamp.saturating_duration_since(released);
            if since <= self.config.drag_threshold() {
                return;
            }
        }
        self.activate();
    }
}
