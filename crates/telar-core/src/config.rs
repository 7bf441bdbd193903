#![forbid(unsafe_code)]

//! Runtime configuration as data.
//!
//! Every tunable of the pool, motion, navigation, preloading and manifest
//! resolution lives in [`RuntimeConfig`]. Hosts pass a (possibly partial)
//! JSON document; unnamed fields keep their defaults.
//!
//! ```json
//! {
//!   "pool": { "max_cards": 6 },
//!   "navigation": { "scroll_cooldown_ms": 500 },
//!   "site": { "origin": "https://example.org", "base_path": "/telar" }
//! }
//! ```
//!
//! Durations are stored as milliseconds so the JSON stays readable; the
//! accessor methods hand out [`Duration`]s.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Top-level RuntimeConfig
// ---------------------------------------------------------------------------

/// All runtime tunables, grouped by component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub pool: PoolConfig,
    pub motion: MotionConfig,
    pub navigation: NavigationConfig,
    pub preload: PreloadConfig,
    pub site: SiteConfig,
}

impl RuntimeConfig {
    /// Load from a JSON string and validate.
    pub fn from_json_str(s: &str) -> Result<Self, LoadError> {
        let config: Self = serde_json::from_str(s)?;
        config.validated()
    }

    /// Return `self` if [`validate`](Self::validate) finds nothing wrong.
    pub fn validated(self) -> Result<Self, LoadError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(LoadError::Validation(errors))
        }
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.pool.max_cards == 0 {
            errors.push("pool.max_cards must be > 0".into());
        }
        if self.pool.readiness_poll_interval_ms == 0 {
            errors.push("pool.readiness_poll_interval_ms must be > 0".into());
        }
        if self.pool.readiness_timeout_ms < self.pool.readiness_poll_interval_ms {
            errors.push(format!(
                "pool.readiness_timeout_ms ({}) must be >= readiness_poll_interval_ms ({})",
                self.pool.readiness_timeout_ms, self.pool.readiness_poll_interval_ms
            ));
        }

        if !(self.motion.spring_stiffness.is_finite() && self.motion.spring_stiffness > 0.0) {
            errors.push(format!(
                "motion.spring_stiffness must be > 0, got {}",
                self.motion.spring_stiffness
            ));
        }

        let nav = &self.navigation;
        for (name, ratio) in [
            ("scroll_threshold_ratio", nav.scroll_threshold_ratio),
            ("swipe_threshold_ratio", nav.swipe_threshold_ratio),
        ] {
            if !(ratio.is_finite() && ratio > 0.0) {
                errors.push(format!("navigation.{name} must be > 0, got {ratio}"));
            }
        }
        if !(nav.max_wheel_delta.is_finite() && nav.max_wheel_delta > 0.0) {
            errors.push(format!(
                "navigation.max_wheel_delta must be > 0, got {}",
                nav.max_wheel_delta
            ));
        }
        if !(0.0..=1.0).contains(&nav.cooldown_damping) {
            errors.push(format!(
                "navigation.cooldown_damping must be in [0, 1], got {}",
                nav.cooldown_damping
            ));
        }

        if self.preload.steps_ahead == 0 && self.preload.steps_behind == 0 {
            tracing::debug!("preloading disabled by configuration");
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Viewer pool bounds and readiness detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of live viewer cards.
    pub max_cards: usize,
    /// Interval between readiness checks on surfaces without a ready signal.
    pub readiness_poll_interval_ms: u64,
    /// Upper bound on waiting for a surface; afterwards it counts as ready.
    pub readiness_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_cards: 10,
            readiness_poll_interval_ms: 100,
            readiness_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}

/// Animated pan/zoom parameters for same-object transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub animation_duration_ms: u64,
    pub spring_stiffness: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            animation_duration_ms: 4_000,
            spring_stiffness: 0.8,
        }
    }
}

impl MotionConfig {
    #[must_use]
    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }
}

/// Input thresholds, cooldowns and strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Viewports narrower than this use button navigation.
    pub mobile_breakpoint_px: f64,
    /// Scroll threshold as a fraction of viewport height.
    pub scroll_threshold_ratio: f64,
    /// Swipe threshold as a fraction of viewport height.
    pub swipe_threshold_ratio: f64,
    /// Per-event wheel delta clamp.
    pub max_wheel_delta: f64,
    pub scroll_cooldown_ms: u64,
    /// Multiplier applied to wheel deltas during the scroll cooldown.
    pub cooldown_damping: f64,
    pub button_cooldown_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            mobile_breakpoint_px: 768.0,
            scroll_threshold_ratio: 0.5,
            swipe_threshold_ratio: 0.2,
            max_wheel_delta: 200.0,
            scroll_cooldown_ms: 600,
            cooldown_damping: 0.5,
            button_cooldown_ms: 400,
        }
    }
}

impl NavigationConfig {
    #[must_use]
    pub fn scroll_cooldown(&self) -> Duration {
        Duration::from_millis(self.scroll_cooldown_ms)
    }

    #[must_use]
    pub fn button_cooldown(&self) -> Duration {
        Duration::from_millis(self.button_cooldown_ms)
    }
}

/// Neighborhood warmed after each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    pub steps_ahead: usize,
    pub steps_behind: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            steps_ahead: 3,
            steps_behind: 1,
        }
    }
}

/// Where locally generated manifests live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme and host, e.g. `https://example.org`.
    pub origin: String,
    /// Site base path, e.g. `/telar`. Empty for root deployments.
    pub base_path: String,
}

impl SiteConfig {
    #[must_use]
    pub fn new(origin: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            base_path: base_path.into(),
        }
    }

    /// Manifest URL for an object served by this site.
    #[must_use]
    pub fn local_manifest_url(&self, object_id: &str) -> String {
        let origin = self.origin.trim_end_matches('/');
        let base = self.base_path.trim_matches('/');
        if base.is_empty() {
            format!("{origin}/iiif/objects/{object_id}/manifest.json")
        } else {
            format!("{origin}/{base}/iiif/objects/{object_id}/manifest.json")
        }
    }
}
