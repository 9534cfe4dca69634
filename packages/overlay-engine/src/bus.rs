//! Typed registry of host listeners.
//!
//! Every listener the engine attaches to the host page goes through one
//! `EventBus`, so teardown is a single [`EventBus::off_all`] call.
//!
//! # Guarantees
//!
//! - **Tracked**: each `on`/`on_debounced` call returns a [`BusSubscriptionId`]
//!   and is recorded until `off`/`off_all`
//! - **Atomic teardown**: `off_all` detaches every host listener and cancels
//!   every pending debounce timer
//! - **No late delivery**: a debounced handler whose subscription was removed
//!   never runs, even if its timer already elapsed in the same tick
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::new(host.clone());
//!
//! bus.on(input, EventKind::Input, |event| debug!(?event.kind, "input"));
//! bus.on_debounced(host.document(), EventKind::Resize, Duration::from_millis(150), |_| {
//!     debug!("resize settled");
//! });
//!
//! bus.off_all();
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, trace};

use crate::host::{DomEvent, ElementId, EventKind, HostPage, Listener, ListenerId};
use crate::timer::{self, TaskHandle};

/// Identifier of one bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusSubscriptionId(u64);

type Handler = Rc<dyn Fn(&DomEvent)>;

/// Trailing-edge debounce around a handler.
struct Debouncer {
    delay: Duration,
    handler: Handler,
    last: RefCell<Option<DomEvent>>,
    timer: RefCell<Option<TaskHandle>>,
    cancelled: Cell<bool>,
}

impl Debouncer {
    fn trigger(self: &Rc<Self>, event: &DomEvent) {
        if self.cancelled.get() {
            return;
        }
        *self.last.borrow_mut() = Some(event.clone());

        let weak: Weak<Debouncer> = Rc::downgrade(self);
        let timer = timer::spawn_timeout(self.delay, move || {
            if let Some(debouncer) = weak.upgrade() {
                debouncer.fire();
            }
        });
        // Replacing the handle aborts the previous timer.
        *self.timer.borrow_mut() = Some(timer);
    }

    fn fire(&self) {
        if self.cancelled.get() {
            return;
        }
        self.timer.borrow_mut().take();
        let event = self.last.borrow_mut().take();
        if let Some(event) = event {
            (self.handler)(&event);
        }
    }

    fn cancel(&self) {
        self.cancelled.set(true);
        self.timer.borrow_mut().take();
        self.last.borrow_mut().take();
    }

    fn is_pending(&self) -> bool {
        self.timer.borrow().is_some()
    }
}

struct BusSubscription {
    listener: ListenerId,
    target: ElementId,
    kind: EventKind,
    debouncer: Option<Rc<Debouncer>>,
}

struct BusInner {
    host: Rc<dyn HostPage>,
    subscriptions: RefCell<BTreeMap<BusSubscriptionId, BusSubscription>>,
    next_id: Cell<u64>,
}

/// Registry of host listeners with optional debounce wrapping.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl EventBus {
    pub fn new(host: Rc<dyn HostPage>) -> Self {
        Self {
            inner: Rc::new(BusInner {
                host,
                subscriptions: RefCell::new(BTreeMap::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    fn next_id(&self) -> BusSubscriptionId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        BusSubscriptionId(id)
    }

    /// Attach `handler` to `kind` events on `target`.
    pub fn on<F>(&self, target: ElementId, kind: EventKind, handler: F) -> BusSubscriptionId
    where
        F: Fn(&DomEvent) + 'static,
    {
        let listener: Listener = Rc::new(handler);
        let listener_id = self.inner.host.add_listener(target, kind, listener);
        let id = self.next_id();
        trace!(?id, %target, %kind, "listener attached");
        self.inner.subscriptions.borrow_mut().insert(
            id,
            BusSubscription {
                listener: listener_id,
                target,
                kind,
                debouncer: None,
            },
        );
        id
    }

    /// Attach `handler` so it runs once `delay` after the last event of a
    /// burst, with that last event.
    pub fn on_debounced<F>(
        &self,
        target: ElementId,
        kind: EventKind,
        delay: Duration,
        handler: F,
    ) -> BusSubscriptionId
    where
        F: Fn(&DomEvent) + 'static,
    {
        let debouncer = Rc::new(Debouncer {
            delay,
            handler: Rc::new(handler),
            last: RefCell::new(None),
            timer: RefCell::new(None),
            cancelled: Cell::new(false),
        });

        let weak = Rc::downgrade(&debouncer);
        let listener: Listener = Rc::new(move |event: &DomEvent| {
            if let Some(debouncer) = weak.upgrade() {
                debouncer.trigger(event);
            }
        });
        let listener_id = self.inner.host.add_listener(target, kind, listener);
        let id = self.next_id();
        trace!(
            ?id,
            %target,
            %kind,
            delay_ms = delay.as_millis() as u64,
            "debounced listener attached"
        );
        self.inner.subscriptions.borrow_mut().insert(
            id,
            BusSubscription {
                listener: listener_id,
                target,
                kind,
                debouncer: Some(debouncer),
            },
        );
        id
    }

    /// Detach one subscription. Returns false if it was already gone.
    pub fn off(&self, id: BusSubscriptionId) -> bool {
        let removed = self.inner.subscriptions.borrow_mut().remove(&id);
        match removed {
            Some(subscription) => {
                self.detach(subscription);
                true
            }
            None => false,
        }
    }

    /// Detach every subscription and cancel every pending debounce.
    pub fn off_all(&self) {
        let drained = std::mem::take(&mut *self.inner.subscriptions.borrow_mut());
        if !drained.is_empty() {
            debug!(count = drained.len(), "detaching all listeners");
        }
        for (_, subscription) in drained {
            self.detach(subscription);
        }
    }

    fn detach(&self, subscription: BusSubscription) {
        if let Some(debouncer) = &subscription.debouncer {
            debouncer.cancel();
        }
        self.inner.host.remove_listener(subscription.listener);
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    /// Debounce timers currently armed.
    pub fn pending_debounces(&self) -> usize {
        self.inner
            .subscriptions
            .borrow()
            .values()
            .filter(|s| s.debouncer.as_ref().is_some_and(|d| d.is_pending()))
            .count()
    }

    /// `(target, kind)` of every live subscription, in subscription order.
    pub fn bindings(&self) -> Vec<(ElementId, EventKind)> {
        self.inner
            .subscriptions
            .borrow()
            .values()
            .map(|s| (s.target, s.kind))
            .collect()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscription_count", &self.subscription_count())
            .finish()
    }
}
