//! Engine and host configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Durations are stored in milliseconds to match the settings
//! blob the extension persists.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::quality::QualityThresholds;

/// Timing and behaviour knobs for one orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period after the last keystroke before `typingStopped`.
    pub typing_timeout_ms: u64,
    /// Safety-net poll of the watched field.
    pub poll_interval_ms: u64,
    /// How long the injection lock holds after an injection or reinit.
    pub injection_lock_ms: u64,
    /// Notification suppression after an injection or reinit.
    pub suppression_window_ms: u64,
    /// A press held longer than this may be a drag.
    pub drag_threshold_ms: u64,
    /// Pointer travel beyond which a long press is a drag.
    pub drag_tolerance_px: f64,
    /// Delay before re-reading the field after Backspace/Delete.
    pub delete_check_delay_ms: u64,
    /// Element discovery retry period when selectors match nothing.
    pub discovery_retry_ms: u64,
    pub discovery_max_attempts: u32,
    pub resize_debounce_ms: u64,
    /// Lifetime of advisory tips.
    pub tip_duration_ms: u64,
    /// Lifetime of error notices.
    pub error_duration_ms: u64,
    /// Request a quality analysis whenever typing stops.
    pub auto_analyze: bool,
    /// Role tag of the overlay element.
    pub overlay_role: String,
    pub thresholds: QualityThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            typing_timeout_ms: 1000,
            poll_interval_ms: 1000,
            injection_lock_ms: 2000,
            suppression_window_ms: 1500,
            drag_threshold_ms: 200,
            drag_tolerance_px: 5.0,
            delete_check_delay_ms: 10,
            discovery_retry_ms: 1000,
            discovery_max_attempts: 10,
            resize_debounce_ms: 150,
            tip_duration_ms: 3000,
            error_duration_ms: 5000,
            auto_analyze: true,
            overlay_role: "prompt-overlay-notification".to_string(),
            thresholds: QualityThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON settings blob.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("failed to parse settings: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("typing_timeout_ms", self.typing_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("discovery_retry_ms", self.discovery_retry_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(EngineError::Config(format!("{} must be greater than zero", name)));
            }
        }

        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.ok) || !(0.0..=1.0).contains(&t.good) {
            return Err(EngineError::Config("quality thresholds must be within 0..=1".into()));
        }
        if t.ok > t.good {
            return Err(EngineError::Config(
                "thresholds.ok must not exceed thresholds.good".into(),
            ));
        }
        if self.overlay_role.trim().is_empty() {
            return Err(EngineError::Config("overlay_role must not be empty".into()));
        }
        if self.drag_tolerance_px.is_nan() || self.drag_tolerance_px < 0.0 {
            return Err(EngineError::Config("drag_tolerance_px must be non-negative".into()));
        }
        Ok(())
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn injection_lock(&self) -> Duration {
        Duration::from_millis(self.injection_lock_ms)
    }

    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    pub fn drag_threshold(&self) -> Duration {
        Duration::from_millis(self.drag_threshold_ms)
    }

    pub fn delete_check_delay(&self) -> Duration {
        Duration::from_millis(self.delete_check_delay_ms)
    }

    pub fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms)
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn tip_duration(&self) -> Duration {
        Duration::from_millis(self.tip_duration_ms)
    }

    pub fn error_duration(&self) -> Duration {
        Duration::from_millis(self.error_duration_ms)
    }
}

/// Where to find the chat field and the widget button on a host page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    pub platform: String,
    pub text_area_selector: String,
    #[serde(default = "default_button_selector")]
    pub button_selector: String,
}

fn default_button_selector() -> String {
    "#prompt-overlay-button".to_string()
}

impl HostConfig {
    pub fn new(platform: impl Into<String>, text_area_selector: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            text_area_selector: text_area_selector.into(),
            button_selector: default_button_selector(),
        }
    }

    pub fn with_button_selector(mut self, selector: impl Into<String>) -> Self {
        self.button_selector = selector.into();
        self
    }

    /// Selector presets for the chat sites the widget ships with.
    pub fn for_platform(platform: &str) -> Option<Self> {
        let selector = match platform {
            "chatgpt" => "#prompt-textarea",
            "claude" => "div.ProseMirror[contenteditable=\"true\"]",
            "gemini" => "rich-textarea .ql-editor",
            "perplexity" => "textarea[placeholder]",
            "copilot" => "textarea#userInput",
            _ => return None,
        };
        Some(Self::new(platform, selector))
    }
}
