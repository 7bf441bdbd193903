#![forbid(unsafe_code)]

//! WASM story runner for Telar scrollytelling pages.
//!
//! This crate provides [`StoryRunner`], a `wasm-bindgen`-exported struct that
//! wraps `telar_core::StoryRuntime` and exposes it to JavaScript for
//! host-driven execution. The page's image-viewer library is reached through a
//! JS host object; see the `wasm` module docs for its contract.

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::StoryRunner;

// Runner core is used by the wasm module and by native tests.
#[cfg(any(target_arch = "wasm32", test))]
mod runner_core;
