#![forbid(unsafe_code)]

//! Normalized story coordinates to surface viewport coordinates.
//!
//! Steps describe where the reader should look with normalized values:
//! `(x, y)` in `[0, 1]` across the image and a zoom *multiplier* relative to
//! the surface's natural ("home") zoom. A rendering surface speaks in its own
//! viewport coordinates, so every position command goes through
//! [`calculate_position`]:
//!
//! ```text
//! point = home_bounds.origin + (x, y) * home_bounds.size
//! zoom  = home_zoom * multiplier
//! ```
//!
//! All functions are pure. Non-finite input yields `None` so callers can skip
//! position application instead of sending garbage to a surface.

use serde::{Deserialize, Serialize};

/// A point in surface viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned rectangle in surface viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// The subset of a rendering surface's viewport that positioning needs.
///
/// Only available once the surface is ready; before that the surface has no
/// home bounds to measure against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceViewport {
    /// Zoom level at which the whole image fits the container.
    pub home_zoom: f64,
    /// Image bounds at home zoom.
    pub home_bounds: Bounds,
}

impl SurfaceViewport {
    #[must_use]
    pub const fn new(home_zoom: f64, home_bounds: Bounds) -> Self {
        Self {
            home_zoom,
            home_bounds,
        }
    }

    fn is_finite(&self) -> bool {
        self.home_zoom.is_finite() && self.home_bounds.is_finite()
    }
}

/// Absolute pan/zoom command for one surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewTarget {
    pub point: Point,
    pub zoom: f64,
}

/// A normalized rectangle inside an image, used by region steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRegion {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Where a step wants the surface to look, in normalized terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewSpec {
    /// Centre on `(x, y)` at `zoom` times the home zoom.
    Point { x: f64, y: f64, zoom: f64 },
    /// Fit a rectangular region.
    Region(NormalizedRegion),
}

impl ViewSpec {
    #[must_use]
    pub const fn point(x: f64, y: f64, zoom: f64) -> Self {
        Self::Point { x, y, zoom }
    }

    /// Resolve against a ready surface viewport.
    #[must_use]
    pub fn resolve(&self, viewport: &SurfaceViewport) -> Option<ViewTarget> {
        match *self {
            Self::Point { x, y, zoom } => calculate_position(viewport, x, y, zoom),
            Self::Region(region) => calculate_region(viewport, &region),
        }
    }
}

/// Convert a normalized position and zoom multiplier into viewport terms.
///
/// Returns `None` when any input is non-finite.
#[must_use]
pub fn calculate_position(
    viewport: &SurfaceViewport,
    x: f64,
    y: f64,
    zoom: f64,
) -> Option<ViewTarget> {
    if !(x.is_finite() && y.is_finite() && zoom.is_finite() && viewport.is_finite()) {
        return None;
    }
    let bounds = viewport.home_bounds;
    let origin = bounds.origin();
    let point = Point::new(origin.x + x * bounds.width, origin.y + y * bounds.height);
    let target = ViewTarget {
        point,
        zoom: viewport.home_zoom * zoom,
    };
    (target.point.is_finite() && target.zoom.is_finite()).then_some(target)
}

/// Centre on a normalized region and zoom so its larger side fills the view.
///
/// Degenerate regions (zero or negative extent) yield `None`.
#[must_use]
pub fn calculate_region(viewport: &SurfaceViewport, region: &NormalizedRegion) -> Option<ViewTarget> {
    let extent = region.width.max(region.height);
    if !extent.is_finite() || extent <= 0.0 {
        return None;
    }
    calculate_position(
        viewport,
        region.x + region.width / 2.0,
        region.y + region.height / 2.0,
        1.0 / extent,
    )
}
