//! End-to-end scenarios driven through a full [`Orchestrator`].
//!
//! Every test runs on paused tokio time inside a `LocalSet`, against an
//! in-memory page, store and backend.

use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::sleep;

use crate::backend::QaPair;
use crate::config::{EngineConfig, HostConfig};
use crate::coordinator::TransitionOutcome;
use crate::error::EngineError;
use crate::host::{ElementId, HostPage};
use crate::notification::{Notification, NotificationId, Priority};
use crate::orchestrator::{InitStatus, Orchestrator};
use crate::quality::QualityMetrics;
use crate::states;
use crate::storage::{AUTH_EXPIRY_KEY, AUTH_TOKEN_KEY, DARK_MODE_KEY, ONBOARDING_KEY};
use crate::testing::{run_local, MemoryHost, MemoryStore, ScriptedBackend};

const INPUT: &str = "#prompt-textarea";
const BUTTON: &str = "#prompt-overlay-button";
const ROLE: &str = "prompt-overlay-notification";

// ==========================================================================
// Harness
// ==========================================================================

struct Harness {
    host: Rc<MemoryHost>,
    store: Rc<MemoryStore>,
    backend: Rc<ScriptedBackend>,
    engine: Orchestrator,
    input: ElementId,
    button: ElementId,
}

impl Harness {
    fn state(&self) -> Option<String> {
        self.engine.state()
    }

    fn active_id(&self) -> Option<NotificationId> {
        self.engine.diagnostics().active_notification
    }

    /// Pointer click as a browser delivers it.
    fn click(&self) {
        self.host.mouse_down(self.button, 10.0, 10.0);
        self.host.mouse_up(10.0, 10.0);
        self.host.click(self.button);
    }
}

fn onboarded_store() -> MemoryStore {
    MemoryStore::with([(ONBOARDING_KEY, json!(true))])
}

fn manual_config() -> EngineConfig {
    EngineConfig {
        auto_analyze: false,
        ..EngineConfig::default()
    }
}

async fn harness_with(config: EngineConfig, store: MemoryStore) -> Harness {
    let host = Rc::new(MemoryHost::new());
    let input = host.add_text_area(INPUT);
    let button = host.add_button(BUTTON);
    let store = Rc::new(store);
    let backend = Rc::new(ScriptedBackend::new());
    let engine = Orchestrator::new(config, host.clone(), store.clone(), backend.clone()).unwrap();

    let status = engine.init(HostConfig::new("test", INPUT)).await.unwrap();
    assert_eq!(status, InitStatus::Attached);

    Harness {
        host,
        store,
        backend,
        engine,
        input,
        button,
    }
}

async fn harness(config: EngineConfig) -> Harness {
    harness_with(config, onboarded_store()).await
}

/// Let spawned backend tasks run.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

// ==========================================================================
// Scenarios
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn test_high_error_preempts_low_warning_then_slot_empties() {
    run_local(async {
        let h = harness(manual_config()).await;
        let warning = Notification::new("warning", Priority::Low, "Add detail");
        h.engine.notify(warning.with_duration_ms(3000));
        assert_eq!(h.active_id(), Some("warning".into()));

        sleep(Duration::from_millis(10)).await;
        let error = Notification::new("error", Priority::High, "Failed");
        h.engine.notify(error.with_duration_ms(500));
        assert_eq!(h.active_id(), Some("error".into()));

        sleep(Duration::from_millis(501)).await;
        let diag = h.engine.diagnostics();
        assert_eq!(diag.active_notification, None);
        assert_eq!(diag.queued_notifications, 0);
        assert!(h.host.elements_with_role(ROLE).is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_typing_lifecycle_and_delete_to_idle() {
    run_local(async {
        let h = harness(manual_config()).await;
        assert_eq!(h.state().as_deref(), Some(states::IDLE));

        h.host.type_text(h.input, "hello");
        assert_eq!(h.state().as_deref(), Some(states::TYPING));

        sleep(Duration::from_millis(999)).await;
        assert_eq!(h.state().as_deref(), Some(states::TYPING));
        sleep(Duration::from_millis(2)).await;
        assert_eq!(h.state().as_deref(), Some(states::TYPING_STOPPED));

        h.host.clear_with_backspace(h.input);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.state().as_deref(), Some(states::IDLE));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_pushed_metrics_use_worst_of_four() {
    run_local(async {
        let h = harness(manual_config()).await;
        let outcome = h
            .engine
            .on_quality_metrics(QualityMetrics::new(0.8, 0.6, 0.75, 0.55))
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(h.state().as_deref(), Some(states::QUALITY_OK));
        assert!(h.host.has_class(h.button, "state-qualityOk"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_injection_lock_drops_then_accepts_quality() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.engine.inject_prompt("Summarize this article in three bullets").unwrap();
        assert_eq!(h.state().as_deref(), Some(states::SUCCESS_IDLE));
        assert_eq!(
            h.host.text_of(h.input).as_deref(),
            Some("Summarize this article in three bullets")
        );

        sleep(Duration::from_millis(500)).await;
        let bad = QualityMetrics::new(0.2, 0.2, 0.2, 0.2);
        assert_eq!(h.engine.on_quality_metrics(bad).unwrap(), TransitionOutcome::Dropped);
        assert_eq!(h.state().as_deref(), Some(states::SUCCESS_IDLE));

        sleep(Duration::from_millis(1600)).await;
        assert!(!h.engine.diagnostics().locked);
        assert_eq!(h.engine.on_quality_metrics(bad).unwrap(), TransitionOutcome::Applied);
        assert_eq!(h.state().as_deref(), Some(states::QUALITY_BAD));
    })
    .await;
}

// ==========================================================================
// Analysis
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn test_typing_stopped_triggers_analysis() {
    run_local(async {
        let h = harness(EngineConfig::default()).await;
        h.host.type_text(h.input, "write a haiku about rust");
        sleep(Duration::from_millis(1001)).await;

        assert_eq!(h.state().as_deref(), Some(states::QUALITY_OK));
        assert_eq!(h.backend.calls(), vec!["quality:write a haiku about rust"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_analysis_result_is_discarded() {
    run_local(async {
        let h = harness(EngineConfig::default()).await;
        h.backend.set_latency(Duration::from_millis(500));

        h.host.type_text(h.input, "first");
        sleep(Duration::from_millis(1001)).await;
        assert_eq!(h.state().as_deref(), Some(states::ANALYZING));

        sleep(Duration::from_millis(199)).await;
        h.host.type_text(h.input, "second prompt");
        assert_eq!(h.state().as_deref(), Some(states::TYPING));

        // First result lands at 1500ms and must not override the new text.
        sleep(Duration::from_millis(400)).await;
        assert_eq!(h.state().as_deref(), Some(states::TYPING));

        sleep(Duration::from_millis(1200)).await;
        assert_eq!(h.state().as_deref(), Some(states::QUALITY_OK));
        assert_eq!(h.backend.calls(), vec!["quality:first", "quality:second prompt"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_analysis_failure_returns_to_typing_stopped() {
    run_local(async {
        let h = harness(EngineConfig::default()).await;
        h.backend.fail_quality();
        h.host.type_text(h.input, "hello there");
        sleep(Duration::from_millis(1001)).await;
        assert_eq!(h.state().as_deref(), Some(states::TYPING_STOPPED));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_bad_quality_raises_tip() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.engine
            .on_quality_metrics(QualityMetrics::new(0.9, 0.9, 0.3, 0.9))
            .unwrap();
        let active = h.engine.active_notification().unwrap();
        assert_eq!(active.id, "quality-tip".into());
        assert!(active.content.contains("intent"));

        h.engine
            .on_quality_metrics(QualityMetrics::new(0.9, 0.9, 0.9, 0.9))
            .unwrap();
        assert_eq!(h.active_id(), None);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_field_forces_idle_on_poll() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.host.type_text(h.input, "hello");
        sleep(Duration::from_millis(1001)).await;
        h.engine
            .on_quality_metrics(QualityMetrics::new(0.8, 0.8, 0.8, 0.8))
            .unwrap();
        assert_eq!(h.state().as_deref(), Some(states::QUALITY_GOOD));

        // Cleared by a script: no event fires.
        h.host.set_field(h.input, "");
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.state().as_deref(), Some(states::IDLE));
    })
    .await;
}

// ==========================================================================
// Activation, injection, refinement
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn test_click_fetches_suggestions() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.host.type_text(h.input, "plan a trip");
        sleep(Duration::from_millis(1001)).await;

        h.click();
        assert_eq!(h.state().as_deref(), Some(states::LOADING));
        settle().await;

        assert_eq!(h.state().as_deref(), Some(states::SUCCESS_WITH_REVIEW));
        let active = h.engine.active_notification().unwrap();
        assert_eq!(active.id, "suggestions".into());
        assert_eq!(active.priority, Priority::Medium);
        assert!(active.content.contains("Name your audience."));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_suggestion_failure_uses_fallback() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.backend.fail_suggestions();
        h.host.type_text(h.input, "plan a trip");
        sleep(Duration::from_millis(1001)).await;

        h.engine.activate();
        settle().await;

        assert_eq!(h.state().as_deref(), Some(states::SUCCESS_WITH_REVIEW));
        let active = h.engine.active_notification().unwrap();
        assert!(active.content.contains(crate::backend::FALLBACK_SUGGESTIONS[0]));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_drag_is_not_a_click() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.host.type_text(h.input, "plan a trip");
        sleep(Duration::from_millis(1001)).await;

        h.host.mouse_down(h.button, 0.0, 0.0);
        sleep(Duration::from_millis(300)).await;
        h.host.mouse_up(50.0, 50.0);
        settle().await;

        assert_eq!(h.state().as_deref(), Some(states::TYPING_STOPPED));
        assert!(h.backend.calls().is_empty());

        // A slow press that stays put is still a click.
        h.host.mouse_down(h.button, 0.0, 0.0);
        sleep(Duration::from_millis(300)).await;
        h.host.mouse_up(2.0, 1.0);
        settle().await;
        assert_eq!(h.backend.calls(), vec!["suggestions:plan a trip"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_pointer_click_activates_once_and_keyboard_click_activates() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.host.type_text(h.input, "plan a trip");
        sleep(Duration::from_millis(1001)).await;

        h.click();
        settle().await;
        assert_eq!(h.backend.calls(), vec!["suggestions:plan a trip"]);

        // Enter or Space on the focused button: click with no press.
        sleep(Duration::from_millis(500)).await;
        h.host.click(h.button);
        settle().await;
        assert_eq!(h.backend.calls().len(), 2);
        assert_eq!(h.state().as_deref(), Some(states::SUCCESS_WITH_REVIEW));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_click_on_empty_field_shows_hint() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.click();
        settle().await;
        assert_eq!(h.active_id(), Some("empty-prompt".into()));
        assert_eq!(h.state().as_deref(), Some(states::IDLE));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_refine_injects_result() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.backend.set_refined("Explain Rust ownership to a Python developer");
        h.host.type_text(h.input, "explain rust");
        sleep(Duration::from_millis(1001)).await;

        h.engine
            .refine_prompt(vec![QaPair::new("Audience?", "Python developers")])
            .await
            .unwrap();

        assert_eq!(
            h.host.text_of(h.input).as_deref(),
            Some("Explain Rust ownership to a Python developer")
        );
        assert_eq!(h.state().as_deref(), Some(states::SUCCESS_IDLE));
        assert!(h.engine.diagnostics().locked);
        assert_eq!(h.backend.calls(), vec!["refine:explain rust"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_refine_failure_keeps_text_and_notifies() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.backend.fail_refine();
        h.host.type_text(h.input, "explain rust");
        sleep(Duration::from_millis(1001)).await;

        let err = h.engine.refine_prompt(Vec::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
        assert_eq!(h.host.text_of(h.input).as_deref(), Some("explain rust"));
        assert_eq!(h.state().as_deref(), Some(states::TYPING_STOPPED));

        let active = h.engine.active_notification().unwrap();
        assert_eq!(active.id, "refine-error".into());
        assert_eq!(active.priority, Priority::High);
        assert!(!active.content.contains("scripted"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_inject_without_session_is_element_not_found() {
    run_local(async {
        let host = Rc::new(MemoryHost::new());
        let engine = Orchestrator::new(
            manual_config(),
            host,
            Rc::new(onboarded_store()),
            Rc::new(ScriptedBackend::new()),
        )
        .unwrap();
        let err = engine.inject_prompt("hi").unwrap_err();
        assert!(matches!(err, EngineError::ElementNotFound { .. }));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_hover_shows_quality_breakdown() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.host.hover(h.button);
        assert_eq!(h.active_id(), None);

        h.engine
            .on_quality_metrics(QualityMetrics::new(0.8, 0.6, 0.75, 0.55))
            .unwrap();
        h.host.hover(h.button);
        let active = h.engine.active_notification().unwrap();
        assert_eq!(active.id, "quality-breakdown".into());
        assert_eq!(
            active.content,
            "clarity 80% · specificity 60% · intent 75% · depth 55%"
        );
    })
    .await;
}

// ==========================================================================
// Preferences
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_run_shows_welcome_and_persists_marker() {
    run_local(async {
        let h = harness_with(manual_config(), MemoryStore::new()).await;
        assert_eq!(h.active_id(), Some("welcome".into()));
        assert_eq!(h.store.value(ONBOARDING_KEY), Some(json!(true)));
        assert!(h.engine.preferences().onboarding_complete);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_dark_mode_decorates_button_and_overlay() {
    run_local(async {
        let store = MemoryStore::with([
            (ONBOARDING_KEY, json!(true)),
            (DARK_MODE_KEY, json!(true)),
        ]);
        let h = harness_with(manual_config(), store).await;
        assert!(h.host.has_class(h.button, "dark"));

        h.engine.notify(Notification::new("n", Priority::Low, "hello"));
        let overlay = h.host.elements_with_role(ROLE)[0];
        assert!(h.host.has_class(overlay, "dark"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_valid_token_is_sent_to_backend() {
    run_local(async {
        let expires = Utc::now() + chrono::Duration::hours(1);
        let store = MemoryStore::with([
            (ONBOARDING_KEY, json!(true)),
            (AUTH_TOKEN_KEY, json!("tok_live")),
            (AUTH_EXPIRY_KEY, json!(expires.timestamp_millis())),
        ]);
        let h = harness_with(manual_config(), store).await;
        h.host.type_text(h.input, "hello");
        h.engine.activate();
        settle().await;
        assert_eq!(h.backend.tokens(), vec![Some("tok_live".to_string())]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_falls_back_to_defaults() {
    run_local(async {
        let store = onboarded_store();
        store.fail_next();
        let h = harness_with(manual_config(), store).await;
        assert!(!h.engine.preferences().dark_mode);
        assert_eq!(h.state().as_deref(), Some(states::IDLE));
    })
    .await;
}

// ==========================================================================
// Discovery and reinitialization
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn test_discovery_retries_until_elements_appear() {
    run_local(async {
        let host = Rc::new(MemoryHost::new());
        let engine = Orchestrator::new(
            manual_config(),
            host.clone(),
            Rc::new(onboarded_store()),
            Rc::new(ScriptedBackend::new()),
        )
        .unwrap();

        let status = engine.init(HostConfig::new("test", INPUT)).await.unwrap();
        assert_eq!(status, InitStatus::Pending);
        assert!(!engine.diagnostics().attached);

        sleep(Duration::from_millis(500)).await;
        let input = host.add_text_area(INPUT);
        host.add_button(BUTTON);

        sleep(Duration::from_millis(501)).await;
        let diag = engine.diagnostics();
        assert!(diag.attached);
        assert!(!diag.locked);
        assert_eq!(diag.state.as_deref(), Some(states::IDLE));

        host.type_text(input, "late page");
        assert_eq!(engine.state().as_deref(), Some(states::TYPING));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_discovery_gives_up_after_max_attempts() {
    run_local(async {
        let host = Rc::new(MemoryHost::new());
        let config = EngineConfig {
            discovery_max_attempts: 2,
            ..manual_config()
        };
        let engine = Orchestrator::new(
            config,
            host.clone(),
            Rc::new(onboarded_store()),
            Rc::new(ScriptedBackend::new()),
        )
        .unwrap();
        engine.init(HostConfig::new("test", INPUT)).await.unwrap();

        sleep(Duration::from_millis(2001)).await;
        assert_eq!(engine.diagnostics().live_timers, 0);

        host.add_text_area(INPUT);
        host.add_button(BUTTON);
        sleep(Duration::from_millis(3000)).await;
        assert!(!engine.diagnostics().attached);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_resize_after_rerender_reattaches() {
    run_local(async {
        let h = harness(manual_config()).await;
        let first_session = h.engine.diagnostics().session_id;
        assert!(first_session.is_some());
        h.host.detach(h.input);
        let fresh = h.host.add_text_area(INPUT);

        h.host.resize();
        sleep(Duration::from_millis(100)).await;
        h.host.resize();
        sleep(Duration::from_millis(151)).await;

        let diag = h.engine.diagnostics();
        assert!(diag.attached);
        assert!(diag.locked);
        assert!(diag.session_id.is_some());
        assert_ne!(diag.session_id, first_session);
        assert_eq!(diag.state.as_deref(), Some(states::IDLE));
        assert_eq!(h.host.listeners_on(h.input), 0);
        assert_eq!(h.host.listeners_on(fresh), 3);

        sleep(Duration::from_millis(2000)).await;
        h.host.type_text(fresh, "after rerender");
        assert_eq!(h.state().as_deref(), Some(states::TYPING));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_resize_without_rerender_keeps_session() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.host.resize();
        sleep(Duration::from_millis(151)).await;
        let diag = h.engine.diagnostics();
        assert!(diag.attached);
        assert!(!diag.locked);
    })
    .await;
}

// ==========================================================================
// Teardown
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_before_init_and_twice_is_clean() {
    run_local(async {
        let host = Rc::new(MemoryHost::new());
        let engine = Orchestrator::new(
            manual_config(),
            host.clone(),
            Rc::new(onboarded_store()),
            Rc::new(ScriptedBackend::new()),
        )
        .unwrap();
        engine.reset();
        engine.reset();

        let diag = engine.diagnostics();
        assert_eq!(diag.listeners, 0);
        assert_eq!(diag.live_timers, 0);
        assert_eq!(diag.state.as_deref(), Some(states::IDLE));
        assert_eq!(host.listener_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_leaves_no_listeners_timers_or_decoration() {
    run_local(async {
        let h = harness(EngineConfig::default()).await;
        h.backend.set_latency(Duration::from_millis(800));
        h.host.type_text(h.input, "hello");
        sleep(Duration::from_millis(1001)).await;
        assert_eq!(h.state().as_deref(), Some(states::ANALYZING));
        h.engine.notify(Notification::new("n", Priority::Low, "tip").with_duration_ms(3000));
        h.host.resize();

        h.engine.reset();
        h.engine.reset();

        let diag = h.engine.diagnostics();
        assert_eq!(h.host.listener_count(), 0);
        assert_eq!(diag.live_timers, 0);
        assert_eq!(diag.in_flight_tasks, 0);
        assert_eq!(diag.active_notification, None);
        assert_eq!(diag.state.as_deref(), Some(states::IDLE));
        assert!(h.host.elements_with_role(ROLE).is_empty());
        assert!(h.host.classes(h.button).is_empty());

        // Nothing scheduled before the reset may fire afterwards.
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(h.state().as_deref(), Some(states::IDLE));
        assert!(h.host.elements_with_role(ROLE).is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_disable_ignores_page_until_next_init() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.engine.disable();
        assert!(h.engine.is_disabled());
        assert_eq!(h.host.listener_count(), 0);

        h.host.type_text(h.input, "ignored");
        assert_eq!(h.state().as_deref(), Some(states::IDLE));

        let status = h.engine.init(HostConfig::new("test", INPUT)).await.unwrap();
        assert_eq!(status, InitStatus::Attached);
        assert!(!h.engine.is_disabled());
        h.host.type_text(h.input, "back again");
        assert_eq!(h.state().as_deref(), Some(states::TYPING));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_pushes_after_disable_leave_page_untouched() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.engine.disable();

        let bad = QualityMetrics::new(0.1, 0.1, 0.1, 0.1);
        assert_eq!(h.engine.on_quality_metrics(bad).unwrap(), TransitionOutcome::Dropped);
        assert_eq!(h.engine.notify(Notification::new("n", Priority::High, "hi")), None);
        assert_eq!(h.engine.reinitialize(), InitStatus::Pending);

        let diag = h.engine.diagnostics();
        assert_eq!(diag.state.as_deref(), Some(states::IDLE));
        assert_eq!(diag.live_timers, 0);
        assert_eq!(diag.active_notification, None);
        assert!(!diag.attached);
        assert_eq!(h.host.listener_count(), 0);
        assert!(h.host.elements_with_role(ROLE).is_empty());
        assert!(h.host.classes(h.button).is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_overlay_nodes_collapse_to_first() {
    run_local(async {
        let h = harness(manual_config()).await;
        let first = h.host.create_element(ROLE);
        h.host.create_element(ROLE);

        h.engine.notify(Notification::new("n", Priority::Medium, "hello"));
        assert_eq!(h.host.elements_with_role(ROLE), vec![first]);
        assert_eq!(h.host.text_of(first).as_deref(), Some("hello"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_animations_toggle_only_cosmetic_classes() {
    run_local(async {
        let h = harness(manual_config()).await;
        h.engine.disable_animations();
        h.host.type_text(h.input, "x");
        assert_eq!(h.state().as_deref(), Some(states::TYPING));
        assert!(h.host.has_class(h.button, "state-typing"));
        assert!(!h.host.classes(h.button).iter().any(|c| c.starts_with("animate-")));

        h.engine.enable_animations();
        sleep(Duration::from_millis(1001)).await;
        assert!(h.host.has_class(h.button, "animate-typingStopped"));
        assert!(!h.host.has_class(h.button, "state-typing"));
    })
    .await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = EngineConfig {
        typing_timeout_ms: 0,
        ..EngineConfig::default()
    };
    let result = Orchestrator::new(
        config,
        Rc::new(MemoryHost::new()),
        Rc::new(MemoryStore::new()),
        Rc::new(ScriptedBackend::new()),
    );
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[tokio::test]
async fn test_empty_selector_is_rejected() {
    let engine = Orchestrator::new(
        EngineConfig::default(),
        Rc::new(MemoryHost::new()),
        Rc::new(MemoryStore::new()),
        Rc::new(ScriptedBackend::new()),
    )
    .unwrap();
    let err = engine.init(HostConfig::new("test", " ")).await.unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}
