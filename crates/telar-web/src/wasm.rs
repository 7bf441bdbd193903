#![forbid(unsafe_code)]

//! `wasm-bindgen` exports for the StoryRunner.
//!
//! This module wraps [`super::runner_core::RunnerCore`] with JS-friendly types
//! and adapts the page's image-viewer library to [`RenderSurface`] through a
//! JS host object. Only compiled on `wasm32` targets.
//!
//! # Host contract
//!
//! The host object passed to the constructor provides:
//!
//! - `createSurface(containerId, objectId, manifestUrl)` returning an adapter
//! - `releaseSurface(containerId, adapter)`
//!
//! Each adapter provides `getViewport()` (`null` until ready, then
//! `{ homeZoom, homeBounds: { x, y, width, height } }`), `panTo(x, y, motion)`,
//! `zoomTo(zoom, refocusX, refocusY, motion)`, `setStackingOrder(order)`,
//! `setActive(active)` and optionally `signalsReadiness` (a boolean or a
//! function returning one). `motion` is `{ immediate, durationMs, springStiffness }`.

use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_time::Instant;

use telar_core::geometry::{Bounds, Point, SurfaceViewport};
use telar_core::panel::PanelUpdate;
use telar_core::surface::{ContainerId, Motion, RenderSurface, SurfaceFactory, SurfaceRequest};

use super::runner_core::{InputReport, RunnerCore, RunnerInput};

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!(
                    "panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                )
            } else {
                format!("panic: {info}")
            };
            console_error(&msg);
        }));
    });
}

fn set_js(obj: &Object, key: &str, value: JsValue) {
    let _ = Reflect::set(obj, &JsValue::from_str(key), &value);
}

fn get_js(target: &JsValue, key: &str) -> Option<JsValue> {
    let value = Reflect::get(target, &JsValue::from_str(key)).ok()?;
    (!value.is_undefined() && !value.is_null()).then_some(value)
}

fn get_f64(target: &JsValue, key: &str) -> Option<f64> {
    get_js(target, key)?.as_f64()
}

/// Call `target[name](...args)`. Missing methods and JS exceptions are
/// reported to the console and yield `None`.
fn call_method(target: &JsValue, name: &str, args: &Array) -> Option<JsValue> {
    let method = get_js(target, name)?.dyn_into::<Function>().ok()?;
    match method.apply(target, args) {
        Ok(value) => Some(value),
        Err(err) => {
            console_error(&format!("{name} threw: {err:?}"));
            None
        }
    }
}

fn container_to_js(container: ContainerId) -> JsValue {
    JsValue::from_f64(container.get() as f64)
}

fn motion_to_js(motion: Motion) -> JsValue {
    let obj = Object::new();
    match motion {
        Motion::Immediate => {
            set_js(&obj, "immediate", JsValue::TRUE);
            set_js(&obj, "durationMs", JsValue::from_f64(0.0));
            set_js(&obj, "springStiffness", JsValue::NULL);
        }
        Motion::Animated(params) => {
            set_js(&obj, "immediate", JsValue::FALSE);
            set_js(
                &obj,
                "durationMs",
                JsValue::from_f64(params.duration.as_secs_f64() * 1000.0),
            );
            set_js(
                &obj,
                "springStiffness",
                JsValue::from_f64(params.spring_stiffness),
            );
        }
    }
    obj.into()
}

fn report_to_js(report: &InputReport) -> JsValue {
    let obj = Object::new();
    set_js(&obj, "outcome", JsValue::from_str(report.outcome));
    set_js(&obj, "accepted", JsValue::from_bool(report.accepted()));
    set_js(
        &obj,
        "transition",
        report.transition.map_or(JsValue::NULL, JsValue::from_str),
    );
    set_js(
        &obj,
        "reason",
        report.reason.map_or(JsValue::NULL, JsValue::from_str),
    );
    obj.into()
}

fn panel_update_to_js(update: &PanelUpdate) -> JsValue {
    let obj = Object::new();
    let closed = Array::new();
    for entry in &update.closed {
        closed.push(&JsValue::from_str(&entry.reference_id));
    }
    set_js(&obj, "closed", closed.into());
    set_js(
        &obj,
        "opened",
        update
            .opened
            .as_ref()
            .map_or(JsValue::NULL, |entry| JsValue::from_str(&entry.reference_id)),
    );
    set_js(
        &obj,
        "lockChanged",
        update.lock_changed.map_or(JsValue::NULL, JsValue::from_bool),
    );
    obj.into()
}

// ---------------------------------------------------------------------------
// JS-backed rendering surface
// ---------------------------------------------------------------------------

/// A viewer card's surface, backed by a host adapter object.
struct JsSurface {
    container: ContainerId,
    adapter: JsValue,
}

impl RenderSurface for JsSurface {
    fn viewport(&self) -> Option<SurfaceViewport> {
        let viewport = call_method(&self.adapter, "getViewport", &Array::new())?;
        if viewport.is_null() || viewport.is_undefined() {
            return None;
        }
        let home_zoom = get_f64(&viewport, "homeZoom")?;
        let bounds = get_js(&viewport, "homeBounds")?;
        Some(SurfaceViewport::new(
            home_zoom,
            Bounds::new(
                get_f64(&bounds, "x")?,
                get_f64(&bounds, "y")?,
                get_f64(&bounds, "width")?,
                get_f64(&bounds, "height")?,
            ),
        ))
    }

    fn pan_to(&mut self, point: Point, motion: Motion) {
        let args = Array::of3(
            &JsValue::from_f64(point.x),
            &JsValue::from_f64(point.y),
            &motion_to_js(motion),
        );
        call_method(&self.adapter, "panTo", &args);
    }

    fn zoom_to(&mut self, zoom: f64, refocus: Point, motion: Motion) {
        let args = Array::of4(
            &JsValue::from_f64(zoom),
            &JsValue::from_f64(refocus.x),
            &JsValue::from_f64(refocus.y),
            &motion_to_js(motion),
        );
        call_method(&self.adapter, "zoomTo", &args);
    }

    fn set_stacking_order(&mut self, order: u32) {
        let args = Array::of1(&JsValue::from_f64(f64::from(order)));
        call_method(&self.adapter, "setStackingOrder", &args);
    }

    fn set_active(&mut self, active: bool) {
        let args = Array::of1(&JsValue::from_bool(active));
        call_method(&self.adapter, "setActive", &args);
    }

    fn signals_readiness(&self) -> bool {
        let Some(value) = get_js(&self.adapter, "signalsReadiness") else {
            return false;
        };
        if value.is_function() {
            call_method(&self.adapter, "signalsReadiness", &Array::new())
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        } else {
            value.as_bool().unwrap_or(false)
        }
    }
}

/// Creates surfaces through the host object's `createSurface`.
struct JsSurfaceFactory {
    host: JsValue,
}

impl SurfaceFactory for JsSurfaceFactory {
    type Surface = JsSurface;

    fn create(&mut self, request: SurfaceRequest<'_>) -> JsSurface {
        let args = Array::of3(
            &container_to_js(request.container),
            &JsValue::from_str(request.object_id),
            &JsValue::from_str(request.manifest_url),
        );
        // A missing adapter never becomes ready; the readiness timeout covers it.
        let adapter = call_method(&self.host, "createSurface", &args).unwrap_or_else(|| {
            console_error(&format!(
                "createSurface returned nothing for {} ({})",
                request.object_id, request.container
            ));
            JsValue::UNDEFINED
        });
        JsSurface {
            container: request.container,
            adapter,
        }
    }

    fn release(&mut self, container: ContainerId, surface: JsSurface) {
        debug_assert_eq!(container, surface.container);
        let args = Array::of2(&container_to_js(container), &surface.adapter);
        call_method(&self.host, "releaseSurface", &args);
    }
}

// ---------------------------------------------------------------------------
// Exported runner
// ---------------------------------------------------------------------------

/// WASM story runner for one Telar story page.
///
/// Host-driven: JavaScript forwards page input, reports surface readiness and
/// prefetch timings, and calls `tick` (or `advanceTime`) from its frame loop.
#[wasm_bindgen]
pub struct StoryRunner {
    inner: RunnerCore<JsSurfaceFactory>,
    started: Instant,
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_panic_hook();
}

#[wasm_bindgen]
impl StoryRunner {
    /// Build a runner from the site build's JSON. Throws on invalid input.
    #[wasm_bindgen(constructor)]
    pub fn new(
        host: JsValue,
        steps_json: &str,
        objects_json: &str,
        config_json: Option<String>,
        viewport_json: &str,
        protected: bool,
    ) -> Result<StoryRunner, JsValue> {
        install_panic_hook();
        let input = RunnerInput {
            steps_json,
            objects_json,
            config_json: config_json.as_deref(),
            viewport_json,
            protected,
        };
        let inner = RunnerCore::new(JsSurfaceFactory { host }, input)
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        Ok(Self {
            inner,
            started: Instant::now(),
        })
    }

    /// Show the first step. Call once, unless the story is protected.
    pub fn init(&mut self) -> bool {
        self.inner.init()
    }

    /// Deliver the unlock signal for a protected story.
    pub fn unlock(&mut self) -> bool {
        self.inner.unlock()
    }

    /// Advance the clock by `dt_ms` milliseconds.
    #[wasm_bindgen(js_name = advanceTime)]
    pub fn advance_time(&mut self, dt_ms: f64) {
        self.inner.advance_time_ms(dt_ms);
    }

    /// Set the clock to absolute milliseconds since construction.
    #[wasm_bindgen(js_name = setTime)]
    pub fn set_time(&mut self, ts_ms: f64) {
        self.inner.set_time_ms(ts_ms);
    }

    /// Set the clock from real elapsed time and run due work.
    pub fn tick(&mut self) {
        self.inner.set_elapsed(self.started.elapsed());
    }

    /// Route a JSON-encoded input event. Returns `null` if malformed.
    #[wasm_bindgen(js_name = pushInput)]
    pub fn push_input(&mut self, json: &str) -> JsValue {
        self.inner
            .push_input_json(json)
            .map_or(JsValue::NULL, |report| report_to_js(&report))
    }

    /// Route a `KeyboardEvent.key` value. Returns `null` for unbound keys.
    #[wasm_bindgen(js_name = pushKey)]
    pub fn push_key(&mut self, key: &str) -> JsValue {
        self.inner
            .push_dom_key(key)
            .map_or(JsValue::NULL, |report| report_to_js(&report))
    }

    #[wasm_bindgen(js_name = setViewport)]
    pub fn set_viewport(&mut self, json: &str) -> bool {
        self.inner.set_viewport_json(json)
    }

    #[wasm_bindgen(js_name = goToStep)]
    pub fn go_to_step(&mut self, index: u32, forward: bool) -> String {
        self.inner.go_to_step(index as usize, forward).to_owned()
    }

    #[wasm_bindgen(js_name = switchToObject)]
    pub fn switch_to_object(
        &mut self,
        object_id: &str,
        x: f64,
        y: f64,
        zoom: f64,
        forward: bool,
    ) -> String {
        self.inner
            .switch_to_object(object_id, x, y, zoom, forward)
            .to_owned()
    }

    /// `layer`: `layer1`, `layer2` or `glossary`. Returns `null` for unknown layers.
    #[wasm_bindgen(js_name = openPanel)]
    pub fn open_panel(&mut self, layer: &str, reference_id: &str) -> JsValue {
        self.inner
            .open_panel(layer, reference_id)
            .map_or(JsValue::NULL, |update| panel_update_to_js(&update))
    }

    #[wasm_bindgen(js_name = closeTopPanel)]
    pub fn close_top_panel(&mut self) -> JsValue {
        panel_update_to_js(&self.inner.close_top_panel())
    }

    #[wasm_bindgen(js_name = closeAllPanels)]
    pub fn close_all_panels(&mut self) -> JsValue {
        panel_update_to_js(&self.inner.close_all_panels())
    }

    /// The adapter for `container_id` fired its open event.
    #[wasm_bindgen(js_name = notifySurfaceReady)]
    pub fn notify_surface_ready(&mut self, container_id: f64) -> bool {
        if !container_id.is_finite() || container_id < 0.0 {
            return false;
        }
        self.inner.notify_surface_ready(container_id as u64)
    }

    /// JSON array of `{ object_id, url }` manifests to fetch once.
    #[wasm_bindgen(js_name = prefetchRequests)]
    pub fn prefetch_requests(&self) -> Option<String> {
        match self.inner.prefetch_requests_json() {
            Ok(json) => Some(json),
            Err(err) => {
                console_error(&format!("prefetchRequests failed: {err}"));
                None
            }
        }
    }

    /// Returns the connection tier once every prefetch has been reported.
    #[wasm_bindgen(js_name = reportPrefetchLoaded)]
    pub fn report_prefetch_loaded(&mut self, object_id: &str, elapsed_ms: f64) -> Option<String> {
        self.inner
            .report_prefetch_loaded(object_id, elapsed_ms)
            .map(str::to_owned)
    }

    #[wasm_bindgen(js_name = reportPrefetchFailed)]
    pub fn report_prefetch_failed(&mut self, object_id: &str) -> Option<String> {
        self.inner
            .report_prefetch_failed(object_id)
            .map(str::to_owned)
    }

    /// Drain page effects as a JSON array.
    #[wasm_bindgen(js_name = takeEffects)]
    pub fn take_effects(&mut self) -> Option<String> {
        match self.inner.take_effects_json() {
            Ok(json) => Some(json),
            Err(err) => {
                console_error(&format!("takeEffects failed: {err}"));
                None
            }
        }
    }

    pub fn snapshot(&self) -> Option<String> {
        match self.inner.snapshot_json() {
            Ok(json) => Some(json),
            Err(err) => {
                console_error(&format!("snapshot failed: {err}"));
                None
            }
        }
    }

    /// Release every surface. The runner ignores input afterwards.
    pub fn destroy(&mut self) {
        self.inner.teardown();
    }
}
