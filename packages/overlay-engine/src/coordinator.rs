//! Gatekeeper between callers and the button state machine.
//!
//! After a prompt injection (or a re-initialization) the button must show a
//! stable success/idle state for a short while, even if typing or quality
//! events arrive in the meantime. The coordinator holds an *injection lock*
//! for that window: only [`states::LOCK_ALLOWED`] transitions pass, every
//! other request is dropped.
//!
//! ```text
//!  request(name) ──► unknown? ──yes──► Err(UnknownState)
//!                       │no
//!                       ▼
//!                   locked && name not lock-allowed? ──yes──► Dropped
//!                       │no
//!                       ▼
//!                   machine.transition(name) ──► surface.play(name)
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::machine::StateMachine;
use crate::scheduler::NotificationScheduler;
use crate::states;
use crate::timer::{self, TaskHandle};

/// What happened to a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Suppressed by the injection lock.
    Dropped,
}

/// Cosmetic animation layer driven by applied transitions.
pub trait AnimationSurface {
    /// Play the animation for `state`.
    fn play(&self, state: &str);
    /// Strip every animation decoration.
    fn clear(&self);
}

struct CoordinatorInner<D> {
    machine: StateMachine<D>,
    scheduler: NotificationScheduler,
    lock_duration: Duration,
    suppression_window: Duration,
    locked: Cell<bool>,
    release_timer: RefCell<Option<TaskHandle>>,
    animations_enabled: Cell<bool>,
    surface: RefCell<Option<Rc<dyn AnimationSurface>>>,
}

impl<D> CoordinatorInner<D> {
    fn release(&self) {
        self.release_timer.borrow_mut().take();
        if self.locked.replace(false) {
            debug!("injection lock released");
        }
    }

    fn surface(&self) -> Option<Rc<dyn AnimationSurface>> {
        self.surface.borrow().clone()
    }
}

/// Lock-aware front door to the button [`StateMachine`].
pub struct AnimationCoordinator<D> {
    inner: Rc<CoordinatorInner<D>>,
}

impl<D> Clone for AnimationCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: 'static> AnimationCoordinator<D> {
    pub fn new(
        machine: StateMachine<D>,
        scheduler: NotificationScheduler,
        lock_duration: Duration,
        suppression_window: Duration,
    ) -> Self {
        Self {
            inner: Rc::new(CoordinatorInner {
                machine,
                scheduler,
                lock_duration,
                suppression_window,
                locked: Cell::new(false),
                release_timer: RefCell::new(None),
                animations_enabled: Cell::new(true),
                surface: RefCell::new(None),
            }),
        }
    }

    /// Attach the animation layer. Replaces any previous surface.
    pub fn set_surface(&self, surface: Rc<dyn AnimationSurface>) {
        *self.inner.surface.borrow_mut() = Some(surface);
    }

    pub fn machine(&self) -> &StateMachine<D> {
        &self.inner.machine
    }

    pub fn current(&self) -> Option<String> {
        self.inner.machine.current()
    }

    /// Ask for a transition to `name`.
    ///
    /// Unknown names are an error even while the lock is held.
    pub fn request(&self, name: &str, data: D) -> Result<TransitionOutcome> {
        if !self.inner.machine.has_state(name) {
            return Err(EngineError::unknown_state(name));
        }
        if self.inner.locked.get() && !states::LOCK_ALLOWED.contains(&name) {
            debug!(state = name, "transition dropped by injection lock");
            return Ok(TransitionOutcome::Dropped);
        }
        self.apply(name, data)?;
        Ok(TransitionOutcome::Applied)
    }

    fn apply(&self, name: &str, data: D) -> Result<()> {
        self.inner.machine.transition(name, data)?;
        if self.inner.animations_enabled.get() {
            if let Some(surface) = self.inner.surface() {
                surface.play(name);
            }
        }
        Ok(())
    }

    /// A prompt was written into the field: clear notifications, suppress
    /// new ones briefly, lock and show `successIdle`.
    pub fn handle_injection(&self, data: D) {
        self.lock_and_force(states::SUCCESS_IDLE, data);
    }

    /// The host page re-rendered and the session was rebuilt: same as an
    /// injection, but lands in `idle`.
    pub fn handle_reinitialization(&self, data: D) {
        self.lock_and_force(states::IDLE, data);
    }

    fn lock_and_force(&self, target: &str, data: D) {
        self.inner.scheduler.remove_all();
        self.inner
            .scheduler
            .enable_suppression_window(self.inner.suppression_window);
        self.take_lock();

        if let Err(e) = self.apply(target, data) {
            // Only reachable if the machine was built without the target state.
            warn!(state = target, error = %e, "forced transition failed");
        }
    }

    /// Take (or extend) the lock; the release timer restarts from now.
    fn take_lock(&self) {
        self.inner.locked.set(true);
        let weak: Weak<CoordinatorInner<D>> = Rc::downgrade(&self.inner);
        let timer = timer::spawn_timeout(self.inner.lock_duration, move || {
            if let Some(inner) = weak.upgrade() {
                inner.release();
            }
        });
        *self.inner.release_timer.borrow_mut() = Some(timer);
        debug!(lock_ms = self.inner.lock_duration.as_millis() as u64, "injection lock taken");
    }

    pub fn release_lock(&self) {
        self.inner.release();
    }

    pub fn is_locked(&self) -> bool {
        self.inner.locked.get()
    }

    /// Toggle cosmetic animations. Disabling strips what is on screen now;
    /// transitions keep working either way.
    pub fn set_animations_enabled(&self, enabled: bool) {
        self.inner.animations_enabled.set(enabled);
        if !enabled {
            if let Some(surface) = self.inner.surface() {
                surface.clear();
            }
        }
    }

    pub fn animations_enabled(&self) -> bool {
        self.inner.animations_enabled.get()
    }

    /// Armed timers owned by the coordinator (0 or 1).
    pub fn live_timers(&self) -> usize {
        usize::from(self.inner.release_timer.borrow().is_some())
    }

    /// Release the lock and strip animations.
    pub fn dispose(&self) {
        self.inner.release();
        if let Some(surface) = self.inner.surface() {
            surface.clear();
        }
    }
}

impl<D> std::fmt::Debug for AnimationCoordinator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationCoordinator")
            .field("locked", &self.inner.locked.get())
            .field("animations_enabled", &self.inner.animations_enabled.get())
            .finish()
    }
}
