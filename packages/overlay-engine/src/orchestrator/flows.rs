//! User-facing flows: activity, analysis, activation, injection, refinement.

use tracing::{debug, info, warn};

use crate::backend::{fallback_suggestions, QaPair};
use crate::coordinator::TransitionOutcome;
use crate::error::{EngineError, Result};
use crate::host::read_text;
use crate::notification::NotificationId;
use crate::quality::{QualityLevel, QualityMetrics};
use crate::states::{self, StatePayload};
use crate::storage::Preferences;
use crate::timer;
use crate::watcher::ActivityEvent;

use super::notices::{self, FailureKind};
use super::session::content_hash;
use super::OrchestratorInner;

impl OrchestratorInner {
    /// Non-blank prompt text of the watched field.
    fn session_prompt(&self) -> Option<String> {
        let input = self.session.borrow().as_ref().map(|s| s.input)?;
        read_text(self.host.as_ref(), input)
            .filter(|content| !content.is_blank())
            .map(|content| content.text().to_string())
    }

    fn missing_input(&self) -> EngineError {
        let selector = self
            .host_config
            .borrow()
            .as_ref()
            .map(|c| c.text_area_selector.clone())
            .unwrap_or_default();
        EngineError::ElementNotFound { selector }
    }

    fn remember_hash(&self, hash: Option<u64>) {
        if let Some(session) = self.session.borrow().as_ref() {
            session.last_content_hash.set(hash);
        }
    }

    fn remembered_hash(&self) -> Option<u64> {
        self.session
            .borrow()
            .as_ref()
            .and_then(|s| s.last_content_hash.get())
    }

    pub(super) fn on_activity(&self, event: ActivityEvent, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }
        let result = match event {
            ActivityEvent::Idle => {
                if self.machine.is_in(states::IDLE) {
                    return;
                }
                self.request(states::IDLE, StatePayload::None)
            }
            ActivityEvent::BecameEmpty => {
                self.scheduler.remove(&NotificationId::from(notices::QUALITY_TIP_ID));
                self.scheduler.remove(&NotificationId::from(notices::QUALITY_BREAKDOWN_ID));
                self.last_quality.set(None);
                self.remember_hash(None);
                return;
            }
            ActivityEvent::Typing => {
                if self.machine.is_in(states::TYPING) {
                    return;
                }
                self.request(states::TYPING, StatePayload::None)
            }
            ActivityEvent::TypingStopped => {
                let outcome = self.request(states::TYPING_STOPPED, StatePayload::None);
                if matches!(outcome, Ok(TransitionOutcome::Applied)) && self.config.auto_analyze {
                    self.start_analysis(epoch);
                }
                outcome
            }
        };
        if let Err(e) = result {
            warn!(?event, error = %e, "activity transition failed");
        }
    }

    fn start_analysis(&self, epoch: u64) {
        let Some(text) = self.session_prompt() else {
            return;
        };
        let hash = content_hash(&text);
        if self.remembered_hash() == Some(hash) {
            if let Some(metrics) = self.last_quality.get() {
                debug!("content unchanged, reusing last analysis");
                if let Err(e) = self.apply_quality(metrics) {
                    warn!(error = %e, "reapplying quality failed");
                }
                return;
            }
        }
        self.remember_hash(Some(hash));

        match self.request(states::ANALYZING, StatePayload::None) {
            Ok(TransitionOutcome::Applied) => {}
            Ok(TransitionOutcome::Dropped) => return,
            Err(e) => {
                warn!(error = %e, "analyzing transition failed");
                return;
            }
        }

        let backend = self.backend.clone();
        let token = self.token();
        let weak = self.weak_self.clone();
        let task = timer::spawn_task(async move {
            let result = backend.quality(&text, token.as_deref()).await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_analysis(epoch, hash, result);
            }
        });
        self.tasks.borrow_mut().push(task);
    }

    fn finish_analysis(&self, epoch: u64, hash: u64, result: Result<QualityMetrics>) {
        if !self.is_current(epoch) {
            debug!("analysis finished for a stale session");
            return;
        }
        let current = self.session_prompt().map(|text| content_hash(&text));
        if current != Some(hash) {
            debug!("prompt changed during analysis, result discarded");
            return;
        }
        if !self.machine.is_in(states::ANALYZING) {
            debug!("analysis superseded by another transition");
            return;
        }

        match result {
            Ok(metrics) => {
                if let Err(e) = self.apply_quality(metrics) {
                    warn!(error = %e, "applying quality failed");
                }
            }
            Err(e) => {
                self.report_failure(FailureKind::Quality, &e);
                self.remember_hash(None);
                if let Err(e) = self.request(states::TYPING_STOPPED, StatePayload::None) {
                    warn!(error = %e, "typingStopped transition failed");
                }
            }
        }
    }

    /// Classify `metrics` and move the button to the matching quality state.
    pub(super) fn apply_quality(&self, metrics: QualityMetrics) -> Result<TransitionOutcome> {
        let metrics = metrics.clamped();
        let level = QualityLevel::classify(&metrics, &self.config.thresholds);
        let outcome = self.request(level.state(), StatePayload::Quality(metrics))?;
        if outcome == TransitionOutcome::Applied {
            self.last_quality.set(Some(metrics));
            debug!(%level, summary = %metrics.summary(), "quality applied");
            if level == QualityLevel::Bad {
                self.scheduler
                    .enqueue(notices::quality_tip(&metrics, self.config.tip_duration()));
            } else {
                self.scheduler.remove(&NotificationId::from(notices::QUALITY_TIP_ID));
            }
        }
        Ok(outcome)
    }

    /// Button click: fetch suggestions for the current prompt.
    pub(super) fn activate(&self) {
        if self.disabled.get() || self.session.borrow().is_none() {
            debug!("activation without an attached session");
            return;
        }
        let Some(text) = self.session_prompt() else {
            self.scheduler
                .enqueue(notices::empty_prompt(self.config.tip_duration()));
            return;
        };

        match self.request(states::LOADING, StatePayload::None) {
            Ok(TransitionOutcome::Applied) => {}
            Ok(TransitionOutcome::Dropped) => return,
            Err(e) => {
                warn!(error = %e, "loading transition failed");
                return;
            }
        }
        info!(chars = text.chars().count(), "fetching suggestions");

        let epoch = self.epoch.get();
        let backend = self.backend.clone();
        let token = self.token();
        let weak = self.weak_self.clone();
        let task = timer::spawn_task(async move {
            let result = backend.suggestions(&text, token.as_deref()).await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_activation(epoch, result);
            }
        });
        self.tasks.borrow_mut().push(task);
    }

    fn finish_activation(&self, epoch: u64, result: Result<Vec<String>>) {
        if !self.is_current(epoch) || !self.machine.is_in(states::LOADING) {
            debug!("suggestions arrived too late, discarded");
            return;
        }
        let items = match result {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => fallback_suggestions(),
            Err(e) => {
                self.report_failure(FailureKind::Suggestions, &e);
                fallback_suggestions()
            }
        };

        let notification = notices::suggestions(&items);
        let payload = StatePayload::Suggestions(items);
        if let Err(e) = self.request(states::SUCCESS_WITH_REVIEW, payload) {
            warn!(error = %e, "successWithReview transition failed");
        }
        self.scheduler.enqueue(notification);
    }

    pub(super) fn inject_prompt(&self, text: &str) -> Result<()> {
        let input = self.session.borrow().as_ref().map(|s| s.input);
        let Some(input) = input.filter(|el| self.host.is_connected(*el)) else {
            return Err(self.missing_input());
        };

        self.host.write_field(input, text);
        self.remember_hash(Some(content_hash(text)));
        self.last_quality.set(None);
        self.coordinator
            .handle_injection(StatePayload::Injected(text.to_string()));
        info!(chars = text.chars().count(), "prompt injected");
        Ok(())
    }

    pub(super) async fn refine_prompt(&self, answers: Vec<QaPair>) -> Result<()> {
        let Some(prompt) = self.session_prompt() else {
            return Err(self.missing_input());
        };
        let epoch = self.epoch.get();
        if self.request(states::LOADING, StatePayload::None)? == TransitionOutcome::Dropped {
            debug!("loading state suppressed by injection lock");
        }

        let token = self.token();
        let result = self.backend.refine(&prompt, &answers, token.as_deref()).await;
        if !self.is_current(epoch) {
            debug!("refinement finished for a stale session");
            return Ok(());
        }

        match result {
            Ok(refined) => self.inject_prompt(&refined),
            Err(e) => {
                self.report_failure(FailureKind::Refine, &e);
                self.scheduler
                    .enqueue(notices::refine_error(&e, self.config.error_duration()));
                if let Err(te) = self.request(states::TYPING_STOPPED, StatePayload::None) {
                    warn!(error = %te, "typingStopped transition failed");
                }
                Err(e)
            }
        }
    }

    /// Hover while a quality state is shown: display the score breakdown.
    pub(super) fn show_breakdown(&self) {
        let in_quality = self
            .machine
            .current()
            .is_some_and(|state| states::is_quality(&state));
        if !in_quality {
            return;
        }
        if let Some(metrics) = self.last_quality.get() {
            self.scheduler
                .enqueue(notices::quality_breakdown(&metrics, self.config.tip_duration()));
        }
    }

    pub(super) fn apply_preferences(&self, prefs: Preferences) {
        self.presenter.set_dark_mode(prefs.dark_mode);
        self.decorator.set_dark(prefs.dark_mode);
        *self.prefs.borrow_mut() = prefs;
    }

    /// Welcome a first-time user and persist the onboarding marker.
    pub(super) async fn greet_first_time_user(&self) {
        if self.prefs.borrow().onboarding_complete {
            return;
        }
        self.scheduler.enqueue(notices::welcome());
        match Preferences::mark_onboarded(self.storage.as_ref()).await {
            Ok(()) => self.prefs.borrow_mut().onboarding_complete = true,
            Err(e) => self.report_failure(FailureKind::Onboarding, &e),
        }
    }
}
