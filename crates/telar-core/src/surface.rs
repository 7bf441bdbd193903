#![forbid(unsafe_code)]

//! Adapter interface between the viewer pool and a zoomable-image library.
//!
//! The pool never touches a rendering library directly. A host implements
//! [`SurfaceFactory`] to allocate one surface per viewer card and
//! [`RenderSurface`] to expose the handful of operations positioning needs.
//!
//! # Readiness
//!
//! Image viewers become usable asynchronously, after their manifest and first
//! tiles load. A surface reports readiness in one of two ways:
//!
//! - **Polled** (default): [`RenderSurface::viewport`] returns `None` until the
//!   surface can accept position commands. The pool polls at a fixed interval.
//! - **Signalled**: [`RenderSurface::signals_readiness`] returns `true` and the
//!   host calls `notify_surface_ready` once when the library's own open event
//!   fires. The pool then skips polling and only keeps the timeout.
//!
//! # Motion
//!
//! Animation parameters travel with each call as [`Motion`]. Adapters must not
//! stash them in shared library state beyond the call, so overlapping
//! animations cannot leave a surface with another call's settings.

use serde::Serialize;
use web_time::Duration;

use crate::geometry::{Point, SurfaceViewport};

/// Opaque handle to a card's container, unique for the runtime's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContainerId(u64);

impl ContainerId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer-card-{}", self.0)
    }
}

/// Parameters of one animated pan/zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimationParams {
    pub duration: Duration,
    pub spring_stiffness: f64,
}

/// How a position command should be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Motion {
    Immediate,
    Animated(AnimationParams),
}

impl Motion {
    #[inline]
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

/// One pooled rendering surface.
pub trait RenderSurface {
    /// Current viewport, or `None` while the surface is not yet ready.
    fn viewport(&self) -> Option<SurfaceViewport>;

    /// Centre the view on `point`.
    fn pan_to(&mut self, point: Point, motion: Motion);

    /// Zoom to an absolute level around `refocus`.
    fn zoom_to(&mut self, zoom: f64, refocus: Point, motion: Motion);

    /// Visual layering among cards; higher is on top.
    fn set_stacking_order(&mut self, order: u32);

    /// Show or demote the card.
    fn set_active(&mut self, active: bool);

    /// Whether the host reports readiness through an event instead of polling.
    fn signals_readiness(&self) -> bool {
        false
    }
}

/// What a factory needs to build a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRequest<'a> {
    pub container: ContainerId,
    pub object_id: &'a str,
    pub manifest_url: &'a str,
}

/// Allocates and releases surfaces for the viewer pool.
pub trait SurfaceFactory {
    type Surface: RenderSurface;

    /// Allocate a container and start loading the manifest.
    fn create(&mut self, request: SurfaceRequest<'_>) -> Self::Surface;

    /// Destroy the surface and free its container.
    fn release(&mut self, container: ContainerId, surface: Self::Surface);
}
