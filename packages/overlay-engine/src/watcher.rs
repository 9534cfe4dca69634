//! Typing activity detection for the watched chat field.
//!
//! The watcher turns raw input events into a coarse activity signal:
//!
//! ```text
//!            input (non-empty)            typing timeout
//!   Empty ─────────────────────► Typing ───────────────► TypingStopped
//!     ▲                            │                          │
//!     └──────── content cleared ───┴──────────────────────────┘
//! ```
//!
//! A low-frequency poll re-reads the field even without events. Script
//! pastes and programmatic clears do not always fire `input`; the poll is
//! the safety net for those.
//!
//! # Timer Ownership
//!
//! The watcher owns its typing timer, the delete re-check timer and the
//! poll. [`InputActivityWatcher::dispose`] cancels all three; any callback
//! already queued checks the `disposed` flag and does nothing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, trace};

use crate::host::{read_text, ElementId, HostPage};
use crate::timer::{self, TaskHandle};

/// Activity signals raised by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// The field is empty. Raised on every observation of an empty field.
    Idle,
    /// A keystroke left non-empty content.
    Typing,
    /// Content is present and no keystroke arrived for the typing timeout.
    TypingStopped,
    /// The field went from non-empty to empty.
    BecameEmpty,
}

/// Coarse phase of the watched field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Empty,
    Typing,
    TypingStopped,
}

type ActivitySink = Rc<dyn Fn(ActivityEvent)>;

struct WatcherInner {
    host: Rc<dyn HostPage>,
    input: ElementId,
    typing_timeout: Duration,
    poll_interval: Duration,
    sink: ActivitySink,
    phase: Cell<WatchPhase>,
    started_typing: Cell<bool>,
    disposed: Cell<bool>,
    typing_timer: RefCell<Option<TaskHandle>>,
    recheck_timer: RefCell<Option<TaskHandle>>,
    poll: RefCell<Option<TaskHandle>>,
    weak_self: Weak<WatcherInner>,
}

impl WatcherInner {
    /// `None` when the field is gone; otherwise whether it is blank.
    fn read_blank(&self) -> Option<bool> {
        read_text(self.host.as_ref(), self.input).map(|content| content.is_blank())
    }

    fn emit(&self, event: ActivityEvent) {
        if self.disposed.get() {
            return;
        }
        trace!(?event, "activity");
        (self.sink)(event);
    }

    /// Move to `Empty`, emitting `BecameEmpty` on the edge and `Idle` always.
    fn observe_empty(&self) {
        let was = self.phase.replace(WatchPhase::Empty);
        self.typing_timer.borrow_mut().take();
        if was != WatchPhase::Empty {
            self.emit(ActivityEvent::BecameEmpty);
        }
        self.emit(ActivityEvent::Idle);
    }

    fn handle_input(&self) {
        if self.disposed.get() {
            return;
        }
        self.started_typing.set(true);
        self.typing_timer.borrow_mut().take();

        match self.read_blank() {
            // Field vanished; the orchestrator rediscovers on its own schedule.
            None => {}
            Some(true) => self.observe_empty(),
            Some(false) => {
                self.phase.set(WatchPhase::Typing);
                self.emit(ActivityEvent::Typing);
                self.arm_typing_timer();
            }
        }
    }

    fn arm_typing_timer(&self) {
        let weak = self.weak_self.clone();
        let timer = timer::spawn_timeout(self.typing_timeout, move || {
            if let Some(inner) = weak.upgrade() {
                inner.typing_timer_fired();
            }
        });
        *self.typing_timer.borrow_mut() = Some(timer);
    }

    fn typing_timer_fired(&self) {
        if self.disposed.get() {
            return;
        }
        self.typing_timer.borrow_mut().take();
        match self.read_blank() {
            None => {}
            Some(true) => self.observe_empty(),
            Some(false) => {
                self.phase.set(WatchPhase::TypingStopped);
                self.emit(ActivityEvent::TypingStopped);
            }
        }
    }

    fn poll_tick(&self) {
        if self.disposed.get() {
            return;
        }
        match self.read_blank() {
            None => {}
            Some(true) => self.observe_empty(),
            Some(false) => {
                if self.phase.get() == WatchPhase::Empty {
                    // Content arrived without any event (script paste).
                    debug!("content appeared without input events");
                    self.phase.set(WatchPhase::TypingStopped);
                    self.emit(ActivityEvent::TypingStopped);
                }
            }
        }
    }
}

/// Watches one input element for typing activity.
///
/// Cheap to clone; clones share the same timers.
#[derive(Clone)]
pub struct InputActivityWatcher {
    inner: Rc<WatcherInner>,
}

impl InputActivityWatcher {
    pub fn new(
        host: Rc<dyn HostPage>,
        input: ElementId,
        typing_timeout: Duration,
        poll_interval: Duration,
        sink: impl Fn(ActivityEvent) + 'static,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak| WatcherInner {
            host,
            input,
            typing_timeout,
            poll_interval,
            sink: Rc::new(sink),
            phase: Cell::new(WatchPhase::Empty),
            started_typing: Cell::new(false),
            disposed: Cell::new(false),
            typing_timer: RefCell::new(None),
            recheck_timer: RefCell::new(None),
            poll: RefCell::new(None),
            weak_self: weak.clone(),
        });
        Self { inner }
    }

    /// Take an initial reading and start the poll.
    pub fn start(&self) {
        if self.inner.disposed.get() {
            return;
        }
        match self.inner.read_blank() {
            Some(false) => self.inner.phase.set(WatchPhase::TypingStopped),
            _ => self.inner.phase.set(WatchPhase::Empty),
        }

        let weak = Rc::downgrade(&self.inner);
        let poll = timer::spawn_interval(self.inner.poll_interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.poll_tick();
            }
        });
        *self.inner.poll.borrow_mut() = Some(poll);
        debug!(input = %self.inner.input, "input watcher started");
    }

    /// Raw `input`/`keyup` event on the field.
    pub fn handle_input(&self) {
        self.inner.handle_input();
    }

    /// Re-read the field after `delay`. Used after delete keys, where the
    /// field only changes once the keydown has been processed.
    pub fn schedule_recheck(&self, delay: Duration) {
        if self.inner.disposed.get() {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        let timer = timer::spawn_timeout(delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.recheck_timer.borrow_mut().take();
                inner.handle_input();
            }
        });
        *self.inner.recheck_timer.borrow_mut() = Some(timer);
    }

    /// Run one poll tick now.
    pub fn poll_now(&self) {
        self.inner.poll_tick();
    }

    /// Whether the field is currently blank. A missing field counts as blank.
    pub fn is_empty(&self) -> bool {
        self.inner.read_blank().unwrap_or(true)
    }

    /// Current field text, if the field is present.
    pub fn text(&self) -> Option<String> {
        read_text(self.inner.host.as_ref(), self.inner.input).map(|c| c.text().to_string())
    }

    pub fn phase(&self) -> WatchPhase {
        self.inner.phase.get()
    }

    /// Whether any keystroke was seen since the watcher started.
    pub fn started_typing(&self) -> bool {
        self.inner.started_typing.get()
    }

    pub fn input(&self) -> ElementId {
        self.inner.input
    }

    /// Armed timers, including the poll.
    pub fn live_timers(&self) -> usize {
        usize::from(self.inner.typing_timer.borrow().is_some())
            + usize::from(self.inner.recheck_timer.borrow().is_some())
            + usize::from(self.inner.poll.borrow().is_some())
    }

    /// Cancel every timer. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.typing_timer.borrow_mut().take();
        self.inner.recheck_timer.borrow_mut().take();
        self.inner.poll.borrow_mut().take();
        debug!(input = %self.inner.input, "input watcher disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl std::fmt::Debug for InputActivityWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputActivityWatcher")
            .field("input", &self.inner.input)
            .field("phase", &self.inner.phase.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}
