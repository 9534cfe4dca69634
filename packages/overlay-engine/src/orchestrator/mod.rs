//! One widget instance bound to one chat field.
//!
//! The orchestrator owns every component and every side effect of the
//! widget: host listeners (through one [`EventBus`]), the input watcher, the
//! notification scheduler, the injection lock and in-flight backend calls.
//!
//! # Lifecycle
//!
//! ```text
//!   new ──► init(host_config) ──► Attached ◄──── discovery retry ◄── Pending
//!                │                   │
//!                │                   ├── resize with detached elements ──► reinitialize
//!                ▼                   ▼
//!              reset() ◄──────── disable()
//! ```
//!
//! Every session gets a fresh *epoch*. Timers and backend futures capture the
//! epoch they were started in and do nothing if it has moved on, so work
//! racing a `reset()` never touches the next session.
//!
//! # Example
//!
//! ```ignore
//! let engine = Orchestrator::new(config, host, storage, backend)?;
//! let status = engine.init(HostConfig::for_platform("chatgpt").unwrap()).await?;
//! info!(?status, "widget ready");
//!
//! engine.on_quality_metrics(QualityMetrics::new(0.8, 0.6, 0.75, 0.55))?;
//! engine.disable();
//! ```

mod flows;
pub mod notices;
mod session;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{AnalysisBackend, QaPair};
use crate::bus::EventBus;
use crate::config::{EngineConfig, HostConfig};
use crate::coordinator::{AnimationCoordinator, TransitionOutcome};
use crate::dom::{ButtonDecorator, OverlayPresenter};
use crate::error::{EngineError, Result};
use crate::host::HostPage;
use crate::machine::{StateHooks, StateMachine};
use crate::notification::{Notification, NotificationId};
use crate::quality::QualityMetrics;
use crate::scheduler::{EnqueueOutcome, NotificationScheduler};
use crate::states::{self, StatePayload};
use crate::storage::{KeyValueStore, Preferences};
use crate::timer::{TaskHandle, TaskSet};

use notices::FailureKind;
use session::{Press, WatchSession};

/// Result of [`Orchestrator::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Input and button were found and wired.
    Attached,
    /// Selectors matched nothing yet; discovery keeps retrying.
    Pending,
}

/// Point-in-time view of the engine's resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub state: Option<String>,
    pub attached: bool,
    pub session_id: Option<Uuid>,
    pub disabled: bool,
    pub locked: bool,
    pub animations_enabled: bool,
    pub listeners: usize,
    pub live_timers: usize,
    pub in_flight_tasks: usize,
    pub active_notification: Option<NotificationId>,
    pub queued_notifications: usize,
    pub pending_notifications: usize,
}

pub(crate) struct OrchestratorInner {
    config: EngineConfig,
    host: Rc<dyn HostPage>,
    storage: Rc<dyn KeyValueStore>,
    backend: Rc<dyn AnalysisBackend>,
    machine: StateMachine<StatePayload>,
    scheduler: NotificationScheduler,
    presenter: Rc<OverlayPresenter>,
    decorator: Rc<ButtonDecorator>,
    coordinator: AnimationCoordinator<StatePayload>,
    bus: EventBus,
    host_config: RefCell<Option<HostConfig>>,
    session: RefCell<Option<WatchSession>>,
    epoch: Cell<u64>,
    disabled: Cell<bool>,
    discovery: RefCell<Option<TaskHandle>>,
    discovery_attempts: Cell<u32>,
    /// Run the re-initialization flow once discovery succeeds.
    reinit_pending: Cell<bool>,
    tasks: RefCell<TaskSet>,
    prefs: RefCell<Preferences>,
    press: Cell<Option<Press>>,
    last_release: Cell<Option<Instant>>,
    last_quality: Cell<Option<QualityMetrics>>,
    warned: RefCell<HashSet<FailureKind>>,
    weak_self: Weak<OrchestratorInner>,
}

impl OrchestratorInner {
    fn build(
        config: EngineConfig,
        host: Rc<dyn HostPage>,
        storage: Rc<dyn KeyValueStore>,
        backend: Rc<dyn AnalysisBackend>,
        weak_self: Weak<OrchestratorInner>,
    ) -> Self {
        let decorator = Rc::new(ButtonDecorator::new(host.clone()));
        let machine = StateMachine::new();
        for name in states::ALL {
            let on_enter = decorator.clone();
            let on_exit = decorator.clone();
            machine.add_state(
                name,
                StateHooks::new()
                    .on_enter(move |_: &StatePayload| on_enter.enter_state(name))
                    .on_exit(move |_: &StatePayload| on_exit.exit_state(name))
                    .transitions(states::declared_transitions(name).iter().copied()),
            );
        }

        let presenter = Rc::new(OverlayPresenter::new(host.clone(), config.overlay_role.clone()));
        let scheduler = NotificationScheduler::new(presenter.clone());
        let coordinator = AnimationCoordinator::new(
            machine.clone(),
            scheduler.clone(),
            config.injection_lock(),
            config.suppression_window(),
        );
        coordinator.set_surface(decorator.clone());
        let bus = EventBus::new(host.clone());

        Self {
            config,
            host,
            storage,
            backend,
            machine,
            scheduler,
            presenter,
            decorator,
            coordinator,
            bus,
            host_config: RefCell::new(None),
            session: RefCell::new(None),
            epoch: Cell::new(0),
            disabled: Cell::new(false),
            discovery: RefCell::new(None),
            discovery_attempts: Cell::new(0),
            reinit_pending: Cell::new(false),
            tasks: RefCell::new(TaskSet::new()),
            prefs: RefCell::new(Preferences::default()),
            press: Cell::new(None),
            last_release: Cell::new(None),
            last_quality: Cell::new(None),
            warned: RefCell::new(HashSet::new()),
            weak_self,
        }
    }

    /// Start a new epoch; everything captured under the old one goes stale.
    fn bump_epoch(&self) -> u64 {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        epoch
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.get() == epoch && !self.disabled.get()
    }

    /// Cached auth token, if still valid.
    fn token(&self) -> Option<String> {
        self.prefs.borrow().valid_token(Utc::now()).map(str::to_string)
    }

    fn request(&self, name: &str, data: StatePayload) -> Result<TransitionOutcome> {
        self.coordinator.request(name, data)
    }

    fn reset(&self) {
        self.bump_epoch();
        self.discovery.borrow_mut().take();
        self.discovery_attempts.set(0);
        self.reinit_pending.set(false);
        self.teardown_session();
        self.scheduler.remove_all();
        self.coordinator.release_lock();
        if let Err(e) = self.machine.transition(states::IDLE, StatePayload::None) {
            debug!(error = %e, "idle transition during reset failed");
        }
        self.coordinator.dispose();
        self.decorator.detach();
        self.presenter.clear();
        self.last_quality.set(None);
    }
}

impl Drop for OrchestratorInner {
    fn drop(&mut self) {
        self.bus.off_all();
        if let Some(session) = self.session.get_mut().take() {
            session.watcher.dispose();
        }
    }
}

/// Cheap-to-clone handle to one widget instance.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Rc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        host: Rc<dyn HostPage>,
        storage: Rc<dyn KeyValueStore>,
        backend: Rc<dyn AnalysisBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let inner = Rc::new_cyclic(|weak| {
            OrchestratorInner::build(config, host, storage, backend, weak.clone())
        });
        Ok(Self { inner })
    }

    /// Bind to the page described by `host_config`.
    ///
    /// Any previous session is reset first. Preferences are loaded before
    /// attaching; a storage failure falls back to defaults.
    pub async fn init(&self, host_config: HostConfig) -> Result<InitStatus> {
        if host_config.text_area_selector.trim().is_empty() {
            return Err(EngineError::Config("text_area_selector must not be empty".into()));
        }

        let inner = &self.inner;
        inner.reset();
        inner.disabled.set(false);
        let epoch = inner.epoch.get();
        info!(platform = %host_config.platform, "initializing overlay");
        *inner.host_config.borrow_mut() = Some(host_config);

        let prefs = match Preferences::load(inner.storage.as_ref()).await {
            Ok(prefs) => prefs,
            Err(e) => {
                inner.report_failure(FailureKind::Preferences, &e);
                Preferences::default()
            }
        };
        if !inner.is_current(epoch) {
            debug!("init superseded while loading preferences");
            return Ok(InitStatus::Pending);
        }
        inner.apply_preferences(prefs);

        let status = if inner.try_attach() {
            InitStatus::Attached
        } else {
            inner.schedule_discovery();
            InitStatus::Pending
        };

        inner.greet_first_time_user().await;
        Ok(status)
    }

    /// Stop everything and return to a clean, detached `idle`.
    ///
    /// Safe to call repeatedly and before `init`.
    pub fn reset(&self) {
        self.inner.reset();
        debug!("overlay reset");
    }

    /// `reset()`, and ignore host callbacks until the next `init`.
    pub fn disable(&self) {
        self.inner.reset();
        self.inner.disabled.set(true);
        info!("overlay disabled");
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.get()
    }

    pub fn enable_animations(&self) {
        self.inner.coordinator.set_animations_enabled(true);
    }

    pub fn disable_animations(&self) {
        self.inner.coordinator.set_animations_enabled(false);
    }

    /// Push quality scores computed elsewhere. Dropped while disabled.
    pub fn on_quality_metrics(&self, metrics: QualityMetrics) -> Result<TransitionOutcome> {
        if self.inner.disabled.get() {
            debug!("quality push ignored, overlay disabled");
            return Ok(TransitionOutcome::Dropped);
        }
        self.inner.apply_quality(metrics)
    }

    /// Same as clicking the button.
    pub fn activate(&self) {
        self.inner.activate();
    }

    /// Write `text` into the chat field and lock the button in `successIdle`.
    pub fn inject_prompt(&self, text: &str) -> Result<()> {
        self.inner.inject_prompt(text)
    }

    /// Ask the backend to rewrite the current prompt using `answers`, then
    /// inject the result. On failure the field is left untouched, a notice is
    /// shown and the button returns to `typingStopped`.
    pub async fn refine_prompt(&self, answers: Vec<QaPair>) -> Result<()> {
        self.inner.refine_prompt(answers).await
    }

    /// Drop the current session, rediscover the elements and run the
    /// re-initialization flow.
    pub fn reinitialize(&self) -> InitStatus {
        if self.inner.disabled.get() {
            debug!("reinitialize ignored, overlay disabled");
            return InitStatus::Pending;
        }
        self.inner.reinitialize()
    }

    /// Show `notification` through the scheduler. `None` while disabled.
    pub fn notify(&self, notification: Notification) -> Option<EnqueueOutcome> {
        if self.inner.disabled.get() {
            debug!(id = %notification.id, "notification ignored, overlay disabled");
            return None;
        }
        Some(self.inner.scheduler.enqueue(notification))
    }

    pub fn dismiss_notification(&self, id: &NotificationId) -> bool {
        self.inner.scheduler.remove(id)
    }

    pub fn state(&self) -> Option<String> {
        self.inner.machine.current()
    }

    pub fn active_notification(&self) -> Option<Notification> {
        self.inner.scheduler.active()
    }

    pub fn preferences(&self) -> Preferences {
        self.inner.prefs.borrow().clone()
    }

    /// Subscribe to button state changes.
    pub fn subscribe(
        &self,
        f: impl Fn(&str, &StatePayload) + 'static,
    ) -> crate::machine::Subscription {
        self.inner.machine.subscribe(f)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let inner = &self.inner;
        let session = inner.session.borrow();
        let watcher_timers = session.as_ref().map_or(0, |s| s.watcher.live_timers());
        let discovery = usize::from(inner.discovery.borrow().is_some());

        Diagnostics {
            state: inner.machine.current(),
            attached: session.is_some(),
            session_id: session.as_ref().map(|s| s.id),
            disabled: inner.disabled.get(),
            locked: inner.coordinator.is_locked(),
            animations_enabled: inner.coordinator.animations_enabled(),
            listeners: inner.bus.subscription_count(),
            live_timers: inner.scheduler.live_timers()
                + inner.coordinator.live_timers()
                + watcher_timers
                + inner.bus.pending_debounces()
                + discovery,
            in_flight_tasks: inner.tasks.borrow().live(),
            active_notification: inner.scheduler.active_id(),
            queued_notifications: inner.scheduler.queued_len(),
            pending_notifications: inner.scheduler.pending_len(),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.inner.machine.current())
            .field("epoch", &self.inner.epoch.get())
            .field("disabled", &self.inner.disabled.get())
            .finish()
    }
}
