//! Priority scheduling for advisory notifications.
//!
//! The scheduler decides which single notification is visible. It holds three
//! FIFO queues (high, medium, low), one active slot and an optional
//! suppression window.
//!
//! # Rules
//!
//! 1. **Single active slot**: at most one notification is shown at a time
//! 2. **Strict preemption**: a queued head replaces the active notification
//!    only if its priority is strictly higher
//! 3. **Disposable losers**: a preempted notification is discarded, not requeued
//! 4. **Idempotent ids**: re-submitting an id replaces the earlier entry
//! 5. **Suppression**: while a window is open, submissions are buffered and
//!    flushed high → medium → low when it closes
//!
//! # Decide, Then Present
//!
//! Every operation first mutates the internal state and collects
//! [`PresentEffect`]s, releases the borrow, then hands the effects to the
//! [`NotificationPresenter`]. A presenter may therefore call back into the
//! scheduler.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::notification::{Notification, NotificationId, NotificationPresenter, Priority};
use crate::timer::{self, TaskHandle};

/// What [`NotificationScheduler::enqueue`] did with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The notification became active.
    Shown,
    /// The notification waits in its priority queue.
    Queued,
    /// A suppression window is open; the notification was buffered.
    Buffered,
    /// The same id was already active; its content and expiry were refreshed.
    Refreshed,
}

enum PresentEffect {
    Show(Notification),
    Hide(NotificationId),
}

struct ActiveSlot {
    notification: Notification,
    generation: u64,
    /// Auto-hide timer; `None` for persistent notifications.
    _expiry: Option<TaskHandle>,
}

struct SuppressionWindow {
    active_until: Instant,
    _timer: TaskHandle,
}

#[derive(Default)]
struct SchedulerState {
    queues: [VecDeque<Notification>; 3],
    active: Option<ActiveSlot>,
    suppression: Option<SuppressionWindow>,
    pending: Vec<Notification>,
    generation: u64,
}

impl SchedulerState {
    fn remove_queued(&mut self, id: &NotificationId) -> bool {
        let mut removed = false;
        for queue in &mut self.queues {
            let before = queue.len();
            queue.retain(|n| &n.id != id);
            removed |= queue.len() != before;
        }
        removed
    }

    fn highest_candidate(&self) -> Option<Priority> {
        Priority::DESCENDING
            .into_iter()
            .find(|p| !self.queues[p.index()].is_empty())
    }

    fn is_active(&self, id: &NotificationId) -> bool {
        self.active.as_ref().is_some_and(|a| &a.notification.id == id)
    }

    fn activate(
        &mut self,
        notification: Notification,
        weak: &Weak<SchedulerInner>,
    ) -> PresentEffect {
        self.generation += 1;
        let generation = self.generation;
        let expiry = notification.duration.map(|duration| {
            let weak = weak.clone();
            timer::spawn_timeout(duration, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(generation);
                }
            })
        });
        debug!(
            id = %notification.id,
            priority = %notification.priority,
            persistent = notification.is_persistent(),
            "notification activated"
        );
        self.active = Some(ActiveSlot {
            notification: notification.clone(),
            generation,
            _expiry: expiry,
        });
        PresentEffect::Show(notification)
    }

    /// One scheduling pass. At most one activation happens: the head of the
    /// highest non-empty queue either takes the slot or nothing does.
    fn dispatch(&mut self, weak: &Weak<SchedulerInner>, effects: &mut Vec<PresentEffect>) {
        let Some(candidate) = self.highest_candidate() else {
            return;
        };

        if let Some(active) = &self.active {
            if candidate <= active.notification.priority {
                trace!(
                    active = %active.notification.id,
                    candidate = %candidate,
                    "candidate cannot preempt"
                );
                return;
            }
        }

        if let Some(preempted) = self.active.take() {
            debug!(
                id = %preempted.notification.id,
                by = %candidate,
                "notification preempted and discarded"
            );
            effects.push(PresentEffect::Hide(preempted.notification.id));
        }

        if let Some(next) = self.queues[candidate.index()].pop_front() {
            let effect = self.activate(next, weak);
            effects.push(effect);
        }
    }

    fn clear(&mut self, effects: &mut Vec<PresentEffect>) {
        for queue in &mut self.queues {
            queue.clear();
        }
        self.pending.clear();
        self.suppression = None;
        if let Some(active) = self.active.take() {
            effects.push(PresentEffect::Hide(active.notification.id));
        }
    }
}

struct SchedulerInner {
    state: RefCell<SchedulerState>,
    presenter: Rc<dyn NotificationPresenter>,
    weak_self: Weak<SchedulerInner>,
}

impl SchedulerInner {
    fn present(&self, effects: Vec<PresentEffect>) {
        for effect in effects {
            match effect {
                PresentEffect::Show(notification) => self.presenter.show(&notification),
                PresentEffect::Hide(id) => self.presenter.hide(&id),
            }
        }
    }

    fn expire(&self, generation: u64) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            let current = state.active.as_ref().map(|a| a.generation);
            if current != Some(generation) {
                // Stale timer: the slot changed hands since it was armed.
                return;
            }
            if let Some(expired) = state.active.take() {
                debug!(id = %expired.notification.id, "notification expired");
                effects.push(PresentEffect::Hide(expired.notification.id));
            }
            state.dispatch(&self.weak_self, &mut effects);
        }
        self.present(effects);
    }

    fn end_suppression(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            if state.suppression.is_none() {
                return;
            }
            state.suppression = None;

            let mut pending = std::mem::take(&mut state.pending);
            // Stable sort keeps FIFO order inside a priority.
            pending.sort_by_key(|n| n.priority.index());
            debug!(count = pending.len(), "suppression window closed, flushing");
            for notification in pending {
                state.remove_queued(&notification.id);
                if state.is_active(&notification.id) {
                    // Re-submitted while on screen: refresh, never queue a twin.
                    state.active = None;
                    let effect = state.activate(notification, &self.weak_self);
                    effects.push(effect);
                    continue;
                }
                let idx = notification.priority.index();
                state.queues[idx].push_back(notification);
            }
            state.dispatch(&self.weak_self, &mut effects);
        }
        self.present(effects);
    }
}

/// Decides which notification is visible.
///
/// Cheap to clone; clones share the same queues and active slot.
#[derive(Clone)]
pub struct NotificationScheduler {
    inner: Rc<SchedulerInner>,
}

impl NotificationScheduler {
    pub fn new(presenter: Rc<dyn NotificationPresenter>) -> Self {
        let inner = Rc::new_cyclic(|weak| SchedulerInner {
            state: RefCell::new(SchedulerState::default()),
            presenter,
            weak_self: weak.clone(),
        });
        Self { inner }
    }

    /// Submit a notification.
    pub fn enqueue(&self, notification: Notification) -> EnqueueOutcome {
        let id = notification.id.clone();
        let mut effects = Vec::new();
        let outcome = {
            let mut state = self.inner.state.borrow_mut();

            if state.suppression.is_some() {
                state.pending.retain(|n| n.id != id);
                state.pending.push(notification);
                debug!(id = %id, "notification buffered during suppression window");
                return EnqueueOutcome::Buffered;
            }

            if state.is_active(&id) {
                // Same id already on screen: refresh in place, restart expiry.
                state.active = None;
                state.remove_queued(&id);
                let effect = state.activate(notification, &self.inner.weak_self);
                effects.push(effect);
                // A lowered priority may now lose to a queued candidate.
                state.dispatch(&self.inner.weak_self, &mut effects);
                EnqueueOutcome::Refreshed
            } else {
                state.remove_queued(&id);
                let idx = notification.priority.index();
                state.queues[idx].push_back(notification);
                state.dispatch(&self.inner.weak_self, &mut effects);

                if state.is_active(&id) {
                    EnqueueOutcome::Shown
                } else {
                    EnqueueOutcome::Queued
                }
            }
        };
        self.inner.present(effects);
        outcome
    }

    /// Run one scheduling pass.
    pub fn dispatch(&self) {
        let mut effects = Vec::new();
        self.inner
            .state
            .borrow_mut()
            .dispatch(&self.inner.weak_self, &mut effects);
        self.inner.present(effects);
    }

    /// Remove a notification wherever it is. Returns true if anything was
    /// removed.
    pub fn remove(&self, id: &NotificationId) -> bool {
        let mut effects = Vec::new();
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            let mut removed = state.remove_queued(id);

            let before = state.pending.len();
            state.pending.retain(|n| &n.id != id);
            removed |= state.pending.len() != before;

            if state.is_active(id) {
                state.active = None;
                effects.push(PresentEffect::Hide(id.clone()));
                state.dispatch(&self.inner.weak_self, &mut effects);
                removed = true;
            }
            removed
        };
        self.inner.present(effects);
        removed
    }

    /// Clear every queue, the pending buffer, the active slot and every timer,
    /// including an open suppression window.
    pub fn remove_all(&self) {
        let mut effects = Vec::new();
        self.inner.state.borrow_mut().clear(&mut effects);
        self.inner.present(effects);
    }

    /// Buffer submissions for `duration`. Opening a window while one is
    /// already open extends it if the new end is later.
    pub fn enable_suppression_window(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.inner.state.borrow_mut();
        if let Some(window) = &state.suppression {
            if window.active_until >= until {
                return;
            }
        }

        let weak = self.inner.weak_self.clone();
        let timer = timer::spawn_timeout(duration, move || {
            if let Some(inner) = weak.upgrade() {
                inner.end_suppression();
            }
        });
        debug!(duration_ms = duration.as_millis() as u64, "suppression window opened");
        state.suppression = Some(SuppressionWindow {
            active_until: until,
            _timer: timer,
        });
    }

    /// Tear everything down. Equivalent to [`NotificationScheduler::remove_all`].
    pub fn dispose(&self) {
        self.remove_all();
    }

    /// The currently visible notification.
    pub fn active(&self) -> Option<Notification> {
        self.inner
            .state
            .borrow()
            .active
            .as_ref()
            .map(|a| a.notification.clone())
    }

    pub fn active_id(&self) -> Option<NotificationId> {
        self.active().map(|n| n.id)
    }

    /// Ids waiting in the queue for `priority`, in order.
    pub fn queued_ids(&self, priority: Priority) -> Vec<NotificationId> {
        self.inner.state.borrow().queues[priority.index()]
            .iter()
            .map(|n| n.id.clone())
            .collect()
    }

    /// Total queued notifications, excluding the active one and the buffer.
    pub fn queued_len(&self) -> usize {
        self.inner.state.borrow().queues.iter().map(VecDeque::len).sum()
    }

    /// Notifications buffered by the suppression window.
    pub fn pending_len(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    pub fn is_suppressed(&self) -> bool {
        self.inner.state.borrow().suppression.is_some()
    }

    /// Armed timers: the active expiry plus the suppression window.
    pub fn live_timers(&self) -> usize {
        let state = self.inner.state.borrow();
        let expiry = state
            .active
            .as_ref()
            .map_or(0, |a| usize::from(!a.notification.is_persistent()));
        expiry + usize::from(state.suppression.is_some())
    }
}

impl std::fmt::Debug for NotificationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("NotificationScheduler")
            .field("active", &state.active.as_ref().map(|a| a.notification.id.clone()))
            .field("queued", &state.queues.iter().map(VecDeque::len).sum::<usize>())
            .field("pending", &state.pending.len())
            .field("suppressed", &state.suppression.is_some())
            .finish()
    }
}
