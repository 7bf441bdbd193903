#![forbid(unsafe_code)]

//! `telar-core` is the host-driven runtime behind Telar scrollytelling stories.
//!
//! A story is a sequence of steps, each bound to a zoomable image object and a
//! view of it. The runtime decides which viewer card is shown, where it looks,
//! and which overlay panels are open; the host renders.
//!
//! Design goals:
//! - **Host-driven I/O**: the embedding environment pushes input events,
//!   viewport changes and readiness signals.
//! - **Deterministic time**: the host advances a monotonic clock explicitly.
//! - **Library-agnostic rendering**: image viewers sit behind the
//!   [`surface::SurfaceFactory`] / [`surface::RenderSurface`] adapter.
//! - **No blocking / no threads**: suitable for `wasm32-unknown-unknown`.
//!
//! # Example
//!
//! ```
//! use telar_core::headless::HeadlessFactory;
//! use telar_core::input::{InputEvent, NavKey};
//! use telar_core::model::{ObjectIndex, Step, Story};
//! use telar_core::navigation::ViewportInfo;
//! use telar_core::{RuntimeConfig, StoryRuntime};
//!
//! let story = Story::new(
//!     vec![Step::at("map", 0.5, 0.5, 1.0), Step::at("map", 0.2, 0.8, 3.0)],
//!     ObjectIndex::new(),
//! );
//! let factory = HeadlessFactory::new();
//! let host = factory.host();
//! let mut runtime = StoryRuntime::new(
//!     story,
//!     RuntimeConfig::default(),
//!     factory,
//!     ViewportInfo::desktop(1280.0, 800.0),
//! );
//! runtime.initialize().unwrap();
//!
//! host.make_ready("map");
//! runtime.advance_time(std::time::Duration::from_millis(100));
//! runtime.handle_input(InputEvent::key(NavKey::ArrowDown));
//! assert_eq!(runtime.snapshot().current_index, Some(1));
//! ```

pub mod cancellation;
pub mod clock;
pub mod config;
pub mod error;
pub mod geometry;
pub mod headless;
pub mod input;
pub mod model;
pub mod navigation;
pub mod panel;
pub mod pool;
pub mod preload;
mod readiness;
pub mod runtime;
pub mod state;
pub mod surface;

pub use config::RuntimeConfig;
pub use error::{LifecycleError, LoadError};
pub use readiness::Readiness;
pub use runtime::{RuntimeSnapshot, StoryRuntime};
pub use state::{PageEffect, RuntimeState};
