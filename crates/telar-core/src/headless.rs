#![forbid(unsafe_code)]

//! In-memory surface adapter.
//!
//! [`HeadlessFactory`] builds [`HeadlessSurface`]s that record every command
//! instead of drawing. A cloneable [`HeadlessHost`] handle lets the caller
//! flip surfaces to ready and inspect what the pool did. Used for native
//! tests of this crate and of the web runner, and for running stories
//! without a browser.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::geometry::{Bounds, Point, SurfaceViewport};
use crate::surface::{ContainerId, Motion, RenderSurface, SurfaceFactory, SurfaceRequest};

/// A recorded position command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceCommand {
    PanTo {
        container: ContainerId,
        point: Point,
        motion: Motion,
    },
    ZoomTo {
        container: ContainerId,
        zoom: f64,
        motion: Motion,
    },
}

impl SurfaceCommand {
    #[must_use]
    pub const fn container(&self) -> ContainerId {
        match self {
            Self::PanTo { container, .. } | Self::ZoomTo { container, .. } => *container,
        }
    }

    #[must_use]
    pub const fn motion(&self) -> Motion {
        match self {
            Self::PanTo { motion, .. } | Self::ZoomTo { motion, .. } => *motion,
        }
    }
}

/// Observable state of one headless surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRecord {
    pub object_id: String,
    pub manifest_url: String,
    pub ready: bool,
    pub active: bool,
    pub stacking_order: u32,
    pub released: bool,
}

#[derive(Debug)]
struct Shared {
    surfaces: BTreeMap<ContainerId, SurfaceRecord>,
    commands: Vec<SurfaceCommand>,
    viewport: SurfaceViewport,
    ready_on_create: bool,
    signals_readiness: bool,
}

/// Control and inspection handle shared by a factory and its surfaces.
#[derive(Debug, Clone)]
pub struct HeadlessHost {
    shared: Rc<RefCell<Shared>>,
}

impl HeadlessHost {
    fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                surfaces: BTreeMap::new(),
                commands: Vec::new(),
                viewport: SurfaceViewport::new(1.0, Bounds::new(0.0, 0.0, 1.0, 1.0)),
                ready_on_create: false,
                signals_readiness: false,
            })),
        }
    }

    /// Surfaces created from now on are ready immediately.
    pub fn set_ready_on_create(&self, ready: bool) {
        self.shared.borrow_mut().ready_on_create = ready;
    }

    /// Surfaces report readiness by event instead of being polled.
    pub fn set_signals_readiness(&self, signals: bool) {
        self.shared.borrow_mut().signals_readiness = signals;
    }

    /// Viewport reported by every ready surface.
    pub fn set_viewport(&self, viewport: SurfaceViewport) {
        self.shared.borrow_mut().viewport = viewport;
    }

    /// Mark the live surface for `object_id` ready. Returns its container.
    pub fn make_ready(&self, object_id: &str) -> Option<ContainerId> {
        let mut shared = self.shared.borrow_mut();
        let (container, record) = shared
            .surfaces
            .iter_mut()
            .find(|(_, r)| !r.released && r.object_id == object_id)?;
        record.ready = true;
        Some(*container)
    }

    /// Live container for `object_id`.
    #[must_use]
    pub fn container_for(&self, object_id: &str) -> Option<ContainerId> {
        self.shared
            .borrow()
            .surfaces
            .iter()
            .find(|(_, r)| !r.released && r.object_id == object_id)
            .map(|(c, _)| *c)
    }

    #[must_use]
    pub fn record(&self, container: ContainerId) -> Option<SurfaceRecord> {
        self.shared.borrow().surfaces.get(&container).cloned()
    }

    /// Number of surfaces ever created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.shared.borrow().surfaces.len()
    }

    /// Number of surfaces created and not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.shared
            .borrow()
            .surfaces
            .values()
            .filter(|r| !r.released)
            .count()
    }

    /// Objects of every released surface, in container order.
    #[must_use]
    pub fn released_objects(&self) -> Vec<String> {
        self.shared
            .borrow()
            .surfaces
            .values()
            .filter(|r| r.released)
            .map(|r| r.object_id.clone())
            .collect()
    }

    /// All position commands so far.
    #[must_use]
    pub fn commands(&self) -> Vec<SurfaceCommand> {
        self.shared.borrow().commands.clone()
    }

    /// Position commands sent to one container.
    #[must_use]
    pub fn commands_for(&self, container: ContainerId) -> Vec<SurfaceCommand> {
        self.shared
            .borrow()
            .commands
            .iter()
            .filter(|c| c.container() == container)
            .copied()
            .collect()
    }

    pub fn clear_commands(&self) {
        self.shared.borrow_mut().commands.clear();
    }

    fn with_record(&self, container: ContainerId, f: impl FnOnce(&mut SurfaceRecord)) {
        if let Some(record) = self.shared.borrow_mut().surfaces.get_mut(&container) {
            f(record);
        }
    }
}

/// Factory producing [`HeadlessSurface`]s.
#[derive(Debug)]
pub struct HeadlessFactory {
    host: HeadlessHost,
}

impl HeadlessFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: HeadlessHost::new(),
        }
    }

    /// A handle observing this factory's surfaces.
    #[must_use]
    pub fn host(&self) -> HeadlessHost {
        self.host.clone()
    }
}

impl Default for HeadlessFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceFactory for HeadlessFactory {
    type Surface = HeadlessSurface;

    fn create(&mut self, request: SurfaceRequest<'_>) -> HeadlessSurface {
        let mut shared = self.host.shared.borrow_mut();
        let ready = shared.ready_on_create;
        shared.surfaces.insert(
            request.container,
            SurfaceRecord {
                object_id: request.object_id.to_owned(),
                manifest_url: request.manifest_url.to_owned(),
                ready,
                active: false,
                stacking_order: 0,
                released: false,
            },
        );
        HeadlessSurface {
            container: request.container,
            host: self.host.clone(),
        }
    }

    fn release(&mut self, container: ContainerId, surface: HeadlessSurface) {
        drop(surface);
        self.host.with_record(container, |r| {
            r.released = true;
            r.active = false;
        });
    }
}

/// A surface that records commands instead of rendering.
#[derive(Debug)]
pub struct HeadlessSurface {
    container: ContainerId,
    host: HeadlessHost,
}

impl RenderSurface for HeadlessSurface {
    fn viewport(&self) -> Option<SurfaceViewport> {
        let shared = self.host.shared.borrow();
        let record = shared.surfaces.get(&self.container)?;
        (record.ready && !record.released).then_some(shared.viewport)
    }

    fn pan_to(&mut self, point: Point, motion: Motion) {
        self.host.shared.borrow_mut().commands.push(SurfaceCommand::PanTo {
            container: self.container,
            point,
            motion,
        });
    }

    fn zoom_to(&mut self, zoom: f64, _refocus: Point, motion: Motion) {
        self.host.shared.borrow_mut().commands.push(SurfaceCommand::ZoomTo {
            container: self.container,
            zoom,
            motion,
        });
    }

    fn set_stacking_order(&mut self, order: u32) {
        self.host.with_record(self.container, |r| r.stacking_order = order);
    }

    fn set_active(&mut self, active: bool) {
        self.host.with_record(self.container, |r| r.active = active);
    }

    fn signals_readiness(&self) -> bool {
        self.host.shared.borrow().signals_readiness
    }
}
