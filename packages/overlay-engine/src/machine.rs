//! Named-state machine with enter/exit hooks and subscribers.
//!
//! The machine is deliberately dumb: it knows which states exist and which one
//! is current, and it runs hooks in a fixed order. Whether a transition is
//! *allowed* is decided by the caller (see [`crate::AnimationCoordinator`]).
//!
//! # Key Properties
//!
//! - **Fail fast**: transitioning to an unregistered name is an error, never a no-op
//! - **Fixed order**: `on_exit(old)` → set current → `on_enter(new)` → subscribers
//! - **Re-entrant reads**: hooks and subscribers run with no internal borrow
//!   held, so they can call [`StateMachine::current`]
//! - **Cheap handle**: cloning shares the same machine
//!
//! # Example
//!
//! ```ignore
//! let machine: StateMachine<()> = StateMachine::new();
//! machine.add_state("idle", StateHooks::new());
//! machine.add_state("typing", StateHooks::new().on_enter(|_| debug!("typing")));
//!
//! let sub = machine.subscribe(|name, _| debug!(state = name, "changed"));
//! machine.transition("typing", ())?;
//! sub.unsubscribe();
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::{EngineError, Result};

type Hook<D> = Box<dyn Fn(&D)>;
type Subscriber<D> = Rc<dyn Fn(&str, &D)>;

/// Hooks and metadata for one state.
pub struct StateHooks<D> {
    on_enter: Option<Hook<D>>,
    on_exit: Option<Hook<D>>,
    on_update: Option<Hook<D>>,
    transitions: Vec<String>,
}

impl<D> StateHooks<D> {
    pub fn new() -> Self {
        Self {
            on_enter: None,
            on_exit: None,
            on_update: None,
            transitions: Vec::new(),
        }
    }

    /// Run when the machine enters this state.
    pub fn on_enter(mut self, f: impl Fn(&D) + 'static) -> Self {
        self.on_enter = Some(Box::new(f));
        self
    }

    /// Run when the machine leaves this state.
    pub fn on_exit(mut self, f: impl Fn(&D) + 'static) -> Self {
        self.on_exit = Some(Box::new(f));
        self
    }

    /// Run by [`StateMachine::update`] while this state is current.
    pub fn on_update(mut self, f: impl Fn(&D) + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    /// Document the states this one is expected to lead to. Informational
    /// only; the machine never enforces it.
    pub fn transitions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transitions = names.into_iter().map(Into::into).collect();
        self
    }
}

impl<D> Default for StateHooks<D> {
    fn default() -> Self {
        Self::new()
    }
}

struct MachineInner<D> {
    states: RefCell<HashMap<String, Rc<StateHooks<D>>>>,
    current: RefCell<Option<String>>,
    subscribers: RefCell<Vec<(u64, Subscriber<D>)>>,
    next_subscriber: Cell<u64>,
}

/// Generic named-state engine.
pub struct StateMachine<D> {
    inner: Rc<MachineInner<D>>,
}

impl<D> Clone for StateMachine<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: 'static> StateMachine<D> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MachineInner {
                states: RefCell::new(HashMap::new()),
                current: RefCell::new(None),
                subscribers: RefCell::new(Vec::new()),
                next_subscriber: Cell::new(0),
            }),
        }
    }

    /// Register (or replace) a state.
    pub fn add_state(&self, name: impl Into<String>, hooks: StateHooks<D>) {
        self.inner
            .states
            .borrow_mut()
            .insert(name.into(), Rc::new(hooks));
    }

    /// Whether `name` is registered.
    pub fn has_state(&self, name: &str) -> bool {
        self.inner.states.borrow().contains_key(name)
    }

    /// Name of the current state, `None` before the first transition.
    pub fn current(&self) -> Option<String> {
        self.inner.current.borrow().clone()
    }

    /// Whether the current state is `name`.
    pub fn is_in(&self, name: &str) -> bool {
        self.inner.current.borrow().as_deref() == Some(name)
    }

    /// The informational transition list declared for `name`.
    pub fn declared_transitions(&self, name: &str) -> Result<Vec<String>> {
        self.inner
            .states
            .borrow()
            .get(name)
            .map(|hooks| hooks.transitions.clone())
            .ok_or_else(|| EngineError::unknown_state(name))
    }

    /// Move to `name`.
    ///
    /// Runs the outgoing state's exit hook, sets the current state, runs the
    /// incoming enter hook, then notifies every subscriber in subscription
    /// order. Re-entering the current state runs both hooks again.
    pub fn transition(&self, name: &str, data: D) -> Result<()> {
        let incoming = self
            .inner
            .states
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::unknown_state(name))?;

        let previous = self.inner.current.borrow().clone();
        let outgoing = previous
            .as_deref()
            .and_then(|prev| self.inner.states.borrow().get(prev).cloned());

        if let Some(hook) = outgoing.as_ref().and_then(|s| s.on_exit.as_ref()) {
            hook(&data);
        }

        *self.inner.current.borrow_mut() = Some(name.to_string());

        if let Some(hook) = incoming.on_enter.as_ref() {
            hook(&data);
        }

        debug!(from = ?previous, to = name, "state transition");

        let subscribers: Vec<Subscriber<D>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(name, &data);
        }

        Ok(())
    }

    /// Run the current state's update hook, if any.
    pub fn update(&self, data: &D) {
        let current = self.inner.current.borrow().clone();
        let hooks = current
            .as_deref()
            .and_then(|name| self.inner.states.borrow().get(name).cloned());
        if let Some(hook) = hooks.as_ref().and_then(|s| s.on_update.as_ref()) {
            hook(data);
        }
    }

    /// Subscribe to transitions. Dropping the returned [`Subscription`] does
    /// NOT unsubscribe; call [`Subscription::unsubscribe`].
    pub fn subscribe(&self, f: impl Fn(&str, &D) + 'static) -> Subscription {
        let id = self.inner.next_subscriber.get();
        self.inner.next_subscriber.set(id + 1);
        self.inner.subscribers.borrow_mut().push((id, Rc::new(f)));

        let weak: Weak<MachineInner<D>> = Rc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

impl<D: 'static> Default for StateMachine<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> std::fmt::Debug for StateMachine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.inner.current.borrow())
            .field("states", &self.inner.states.borrow().len())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

/// Handle returned by [`StateMachine::subscribe`].
pub struct Subscription {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}
