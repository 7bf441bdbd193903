#![forbid(unsafe_code)]

//! Neighborhood warming and startup manifest prefetch.
//!
//! Two independent ways of hiding load latency:
//!
//! - **Warming** creates viewer cards for objects a few steps around the
//!   current one, so that the reader arrives at a card that is already
//!   loaded and parked at the right view. It runs after every committed
//!   transition. When the pool is full it makes room only from idle cards:
//!   never the active card, the pending switch target or another object in
//!   the window.
//! - **Prefetch** asks the host to fetch each distinct manifest once at
//!   startup. The host reports timings back; the resulting
//!   [`LatencySummary`] picks a [`ConnectionTier`] that retunes the warming
//!   window and the readiness timeout.

use std::collections::HashSet;

use serde::Serialize;
use web_time::Duration;

use crate::clock::Timestamp;
use crate::config::{PreloadConfig, RuntimeConfig, SiteConfig};
use crate::geometry::ViewSpec;
use crate::model::{Story, object_key};
use crate::pool::{PoolRejection, ViewerPool, manifest_url};
use crate::surface::SurfaceFactory;

// ---------------------------------------------------------------------------
// Neighborhood warming
// ---------------------------------------------------------------------------

/// One object to warm and the view it should be parked at.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadTarget {
    pub object_id: String,
    /// First in-window step that uses the object.
    pub step_index: usize,
    pub view: Option<ViewSpec>,
}

/// Objects in the window around `current`, steps ahead first.
///
/// Each object appears once, at its first in-window step. The object on
/// screen at `current`, intro slides and steps without an object are skipped.
#[must_use]
pub fn neighborhood(story: &Story, current: usize, window: PreloadConfig) -> Vec<PreloadTarget> {
    let displayed = story
        .step(current)
        .and_then(|step| step.object_id())
        .map(object_key);

    let ahead = (current + 1..=current.saturating_add(window.steps_ahead)).take_while(|&i| i < story.len());
    let behind = (current.saturating_sub(window.steps_behind)..current).rev();

    let mut seen: HashSet<String> = displayed.into_iter().collect();
    let mut targets = Vec::new();
    for index in ahead.chain(behind) {
        let Some(step) = story.step(index) else {
            continue;
        };
        if step.intro {
            continue;
        }
        let Some(object_id) = step.object_id() else {
            continue;
        };
        if seen.insert(object_key(object_id)) {
            targets.push(PreloadTarget {
                object_id: object_id.to_owned(),
                step_index: index,
                view: step.view_spec(),
            });
        }
    }
    targets
}

/// What one warming pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Objects that got a new card.
    pub created: Vec<String>,
    /// Objects skipped because the pool was full.
    pub saturated: Vec<String>,
    /// Objects whose idle cards were evicted to make room.
    pub evicted: Vec<String>,
}

/// Create cards for the neighborhood of `current`.
///
/// `keep` names objects outside the window that must not be evicted, such as
/// the pending switch target.
pub fn warm<F: SurfaceFactory>(
    pool: &mut ViewerPool<F>,
    story: &Story,
    current: usize,
    window: PreloadConfig,
    keep: &[&str],
    now: Timestamp,
) -> WarmReport {
    let targets = neighborhood(story, current, window);
    let pinned: HashSet<String> = targets
        .iter()
        .map(|target| target.object_id.as_str())
        .chain(keep.iter().copied())
        .chain(story.step(current).and_then(|step| step.object_id()))
        .map(object_key)
        .collect();

    let mut report = WarmReport::default();
    for target in targets {
        match pool.try_preload(&story.objects, &target.object_id, target.view, &pinned, now) {
            Ok(handle) => {
                report.evicted.extend(handle.evicted);
                if handle.created {
                    report.created.push(target.object_id);
                }
            }
            Err(PoolRejection::Saturated) => report.saturated.push(target.object_id),
        }
    }
    if !report.created.is_empty() || !report.saturated.is_empty() {
        tracing::debug!(
            current,
            created = report.created.len(),
            saturated = report.saturated.len(),
            evicted = report.evicted.len(),
            "neighborhood warmed"
        );
    }
    report
}

// ---------------------------------------------------------------------------
// Manifest prefetch
// ---------------------------------------------------------------------------

/// One manifest the host should fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefetchRequest {
    pub object_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FetchResult {
    Loaded(Duration),
    Failed,
}

/// Startup prefetch plan and its collected timings.
#[derive(Debug, Clone, Default)]
pub struct ManifestPrefetch {
    requests: Vec<PrefetchRequest>,
    results: Vec<Option<FetchResult>>,
}

impl ManifestPrefetch {
    /// One request per distinct object, in story order.
    #[must_use]
    pub fn plan(story: &Story, site: &SiteConfig) -> Self {
        let mut seen = HashSet::new();
        let requests: Vec<PrefetchRequest> = story
            .steps
            .iter()
            .filter_map(|step| step.object_id())
            .filter(|id| seen.insert(object_key(id)))
            .map(|id| PrefetchRequest {
                object_id: id.to_owned(),
                url: manifest_url(&story.objects, site, id),
            })
            .collect();
        let results = vec![None; requests.len()];
        Self { requests, results }
    }

    #[must_use]
    pub fn requests(&self) -> &[PrefetchRequest] {
        &self.requests
    }

    /// Record a completed fetch. Returns false for unknown or already
    /// reported objects.
    pub fn record_loaded(&mut self, object_id: &str, elapsed: Duration) -> bool {
        self.record(object_id, FetchResult::Loaded(elapsed))
    }

    /// Record a failed fetch. Failures never block startup.
    pub fn record_failed(&mut self, object_id: &str) -> bool {
        tracing::warn!(object_id, "manifest prefetch failed");
        self.record(object_id, FetchResult::Failed)
    }

    fn record(&mut self, object_id: &str, result: FetchResult) -> bool {
        let key = object_key(object_id);
        let Some(slot) = self
            .requests
            .iter()
            .position(|r| object_key(&r.object_id) == key)
        else {
            return false;
        };
        if self.results[slot].is_some() {
            return false;
        }
        self.results[slot] = Some(result);
        true
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.results.iter().filter(|r| r.is_none()).count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    /// Timings reported so far.
    #[must_use]
    pub fn summary(&self) -> LatencySummary {
        let mut summary = LatencySummary::default();
        let mut total = Duration::ZERO;
        let mut loaded = 0u32;
        for result in self.results.iter().flatten() {
            summary.count += 1;
            match *result {
                FetchResult::Loaded(elapsed) => {
                    loaded += 1;
                    total += elapsed;
                    summary.max = Some(summary.max.map_or(elapsed, |m| m.max(elapsed)));
                }
                FetchResult::Failed => summary.failures += 1,
            }
        }
        if loaded > 0 {
            summary.mean = Some(total / loaded);
        }
        summary
    }
}

/// Aggregate of prefetch timings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    /// Reported fetches, failures included.
    pub count: usize,
    pub failures: usize,
    /// Mean over successful fetches.
    pub mean: Option<Duration>,
    pub max: Option<Duration>,
}

impl LatencySummary {
    /// Classify the connection.
    ///
    /// No reports at all means there was nothing to measure: the defaults
    /// stay. Only failures count as slow.
    #[must_use]
    pub fn tier(&self) -> ConnectionTier {
        match self.mean {
            Some(mean) if mean < Duration::from_millis(300) => ConnectionTier::Fast,
            Some(mean) if mean < Duration::from_millis(1_000) => ConnectionTier::Moderate,
            Some(_) => ConnectionTier::Slow,
            None if self.failures > 0 => ConnectionTier::Slow,
            None => ConnectionTier::Moderate,
        }
    }
}

/// Coarse connection speed derived from prefetch timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionTier {
    Fast,
    Moderate,
    Slow,
}

/// Thresholds chosen for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub preload: PreloadConfig,
    pub readiness_timeout: Duration,
}

impl ConnectionTier {
    /// Warming window and readiness timeout for this tier.
    #[must_use]
    pub fn tune(self, config: &RuntimeConfig) -> Tuning {
        let timeout = config.pool.readiness_timeout();
        match self {
            Self::Fast => Tuning {
                preload: PreloadConfig {
                    steps_ahead: 2,
                    steps_behind: 1,
                },
                readiness_timeout: timeout,
            },
            Self::Moderate => Tuning {
                preload: config.preload,
                readiness_timeout: timeout,
            },
            Self::Slow => Tuning {
                preload: PreloadConfig {
                    steps_ahead: 5,
                    steps_behind: 2,
                },
                readiness_timeout: timeout.saturating_mul(2),
            },
        }
    }
}
