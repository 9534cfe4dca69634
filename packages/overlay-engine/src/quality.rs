//! Prompt quality metrics and their mapping to button states.
//!
//! The analysis service scores a prompt on four axes, each normalized to
//! 0–1. The button shows one of three discrete levels. Aggregation is
//! worst-of-four: a prompt is only as good as its weakest axis.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::states;

/// Quality sub-scores, each in 0–1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub clarity: f64,
    pub specificity: f64,
    pub intent: f64,
    pub depth: f64,
}

impl QualityMetrics {
    pub fn new(clarity: f64, specificity: f64, intent: f64, depth: f64) -> Self {
        Self {
            clarity,
            specificity,
            intent,
            depth,
        }
    }

    /// Copy with every score clamped to 0–1. NaN counts as 0.
    pub fn clamped(&self) -> Self {
        fn clamp(v: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, 1.0)
            }
        }
        Self {
            clarity: clamp(self.clarity),
            specificity: clamp(self.specificity),
            intent: clamp(self.intent),
            depth: clamp(self.depth),
        }
    }

    /// Named scores in display order.
    pub fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("clarity", self.clarity),
            ("specificity", self.specificity),
            ("intent", self.intent),
            ("depth", self.depth),
        ]
    }

    /// The lowest score and its name, after clamping.
    pub fn weakest(&self) -> (&'static str, f64) {
        let clamped = self.clamped();
        clamped
            .named()
            .into_iter()
            .fold(("clarity", f64::INFINITY), |acc, item| {
                if item.1 < acc.1 {
                    item
                } else {
                    acc
                }
            })
    }

    /// One-line human summary, e.g. `clarity 80% · specificity 60% · ...`.
    pub fn summary(&self) -> String {
        self.clamped()
            .named()
            .iter()
            .map(|(name, score)| format!("{} {}%", name, (score * 100.0).round() as u32))
            .collect::<Vec<_>>()
            .join(" · ")
    }
}

/// Thresholds separating the three levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum score for `Good`.
    pub good: f64,
    /// Minimum score for `Ok`.
    pub ok: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self { good: 0.7, ok: 0.5 }
    }
}

/// Discrete quality shown on the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityLevel {
    Bad,
    Ok,
    Good,
}

impl QualityLevel {
    /// Worst-of-four classification.
    pub fn classify(metrics: &QualityMetrics, thresholds: &QualityThresholds) -> Self {
        let (_, weakest) = metrics.weakest();
        if weakest >= thresholds.good {
            QualityLevel::Good
        } else if weakest >= thresholds.ok {
            QualityLevel::Ok
        } else {
            QualityLevel::Bad
        }
    }

    /// The button state this level drives.
    pub fn state(&self) -> &'static str {
        match self {
            QualityLevel::Bad => states::QUALITY_BAD,
            QualityLevel::Ok => states::QUALITY_OK,
            QualityLevel::Good => states::QUALITY_GOOD,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLevel::Bad => write!(f, "bad"),
            QualityLevel::Ok => write!(f, "ok"),
            QualityLevel::Good => write!(f, "good"),
        }
    }
}
