//! # Overlay Engine
//!
//! State and notification coordination for a prompt-assistant widget that
//! lives inside third-party AI-chat pages.
//!
//! ## Core Concepts
//!
//! The widget is a button next to the chat field plus a single overlay
//! bubble. The engine decides what both show:
//! - [`StateMachine`] = which state the button is in (`idle`, `typing`, ...)
//! - [`NotificationScheduler`] = which single notification the bubble shows
//! - [`AnimationCoordinator`] = who may change the button state right now
//! - [`InputActivityWatcher`] = what the user is doing in the chat field
//! - [`Orchestrator`] = one widget instance wiring all of the above to a page
//!
//! The key principle: **components decide, presenters render**. Every
//! component settles its own state first and only then calls out to the
//! host page.
//!
//! ## Architecture
//!
//! ```text
//! HostPage (listeners)
//!     │
//!     ▼ EventBus
//! Orchestrator ─────────────────────────────────────┐
//!     │                                             │
//!     ├─► InputActivityWatcher ─► ActivityEvent ────┤
//!     │                                             │
//!     ├─► AnalysisBackend (spawned task) ─► quality ┤
//!     │                                             ▼
//!     │                                  AnimationCoordinator
//!     │                                       │ (injection lock)
//!     │                                       ▼
//!     │                                  StateMachine ─► ButtonDecorator
//!     │
//!     └─► NotificationScheduler ─► OverlayPresenter ─► HostPage
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One bubble** - at most one notification is visible at any instant
//! 2. **Strict preemption** - only a strictly higher priority replaces the
//!    visible notification; the loser is discarded
//! 3. **Lock window** - after an injection only success/idle states apply
//! 4. **Empty means idle** - an empty field forces `idle` on the next event or poll
//! 5. **Owned timers** - every timer belongs to one component and dies with it
//!
//! ## Runtime
//!
//! The engine is single-threaded. Drive it from a current-thread tokio
//! runtime inside a [`tokio::task::LocalSet`]; all timers are
//! `spawn_local` tasks.
//!
//! ## Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use overlay_engine::{EngineConfig, HostConfig, HttpAnalysisBackend, Orchestrator};
//!
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let engine = Orchestrator::new(
//!         EngineConfig::default(),
//!         page.clone(),
//!         Rc::new(extension_storage),
//!         Rc::new(HttpAnalysisBackend::new("https://api.promptoverlay.dev/v1")),
//!     )?;
//!
//!     engine.init(HostConfig::for_platform("chatgpt").unwrap()).await?;
//!     // ... the page runs ...
//!     engine.disable();
//! }).await;
//! ```

// Core modules
mod backend;
mod bus;
mod config;
mod coordinator;
mod dom;
mod error;
mod host;
mod machine;
mod notification;
mod quality;
mod scheduler;
mod storage;
mod timer;
mod watcher;

// Button state names and payloads
pub mod states;

// Widget instance
pub mod orchestrator;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// End-to-end scenarios (test-only)
#[cfg(test)]
mod scenario_tests;

// Re-export error types
pub use crate::error::{EngineError, ErrorCategory, Result};

// Re-export host types
pub use host::{
    read_text, DomEvent, ElementId, EventKind, FieldContent, HostPage, Listener, ListenerId,
};

// Re-export configuration
pub use config::{EngineConfig, HostConfig};

// Re-export machine types
pub use machine::{StateHooks, StateMachine, Subscription};

// Re-export notification types
pub use notification::{Notification, NotificationId, NotificationPresenter, Priority};
pub use scheduler::{EnqueueOutcome, NotificationScheduler};

// Re-export coordination types
pub use coordinator::{AnimationCoordinator, AnimationSurface, TransitionOutcome};
pub use watcher::{ActivityEvent, InputActivityWatcher, WatchPhase};

// Re-export DOM helpers
pub use dom::{ensure_singleton, remove_all_with_role, ButtonDecorator, OverlayPresenter};

// Re-export bus types
pub use bus::{BusSubscriptionId, EventBus};

// Re-export timer types
pub use timer::{TaskHandle, TaskSet};

// Re-export quality types
pub use quality::{QualityLevel, QualityMetrics, QualityThresholds};
pub use states::StatePayload;

// Re-export remote seams
pub use backend::{
    fallback_suggestions, AnalysisBackend, HttpAnalysisBackend, QaPair, FALLBACK_SUGGESTIONS,
};
pub use storage::{KeyValueStore, Preferences};

// Re-export the widget instance
pub use orchestrator::{Diagnostics, InitStatus, Orchestrator};

// Re-export commonly used external types
pub use async_trait::async_trait;
