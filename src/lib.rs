#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod correspondence;
pub mod error;
pub mod fingerprint;
pub mod geom;
pub mod host;
pub mod interpolate;
pub mod ledger;
pub mod persist;
pub mod playback;
pub mod pose;
pub mod recording;
pub mod schedule;
pub mod session;
pub mod settings;
pub mod snapshot;

use std::fmt;
use std::time::Duration;

use geom::Point3;
use host::{MemoryHost, MeshAccess};
use playback::Selection;
use schedule::SimulatedClock;
use serde::{Deserialize, Serialize};
use session::Session;
use settings::RecorderSettings;
use snapshot::MeshData;
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            // no-op fallback when panic hook is disabled
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {
    // no-op fallback when debug logs are disabled
}

#[cfg(all(feature = "parallel", target_arch = "wasm32"))]
#[wasm_bindgen]
pub async fn initialize_parallel(worker_count: Option<u32>) -> Result<(), JsError> {
    let threads = worker_count
        .map(|count| count.max(1) as usize)
        .or_else(|| {
            std::thread::available_parallelism()
                .map(|value| value.get())
                .ok()
        })
        .unwrap_or(1);

    wasm_bindgen_rayon::init_thread_pool(threads)
        .await
        .map_err(|err| JsError::new(&format!("could not start rayon thread pool: {err}")))
}

#[macro_export]
macro_rules! debug_log {
    ($($t:tt)*) => {{
        #[cfg(feature = "debug_logs")]
        {
            #[cfg(target_arch = "wasm32")]
            {
                ::web_sys::console::log_1(&::wasm_bindgen::JsValue::from_str(&format!($($t)*)));
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                println!("{}", format!($($t)*));
            }
        }
    }};
}

/// Mesh as exchanged with JavaScript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MeshExport {
    vertices: Vec<[f64; 3]>,
    #[serde(default)]
    edges: Vec<[u32; 2]>,
    #[serde(default)]
    faces: Vec<Vec<u32>>,
}

impl From<MeshExport> for MeshData {
    fn from(export: MeshExport) -> Self {
        MeshData::new(
            export.vertices.into_iter().map(Point3::from_array).collect(),
            export.edges,
            export.faces,
        )
    }
}

impl From<&MeshData> for MeshExport {
    fn from(mesh: &MeshData) -> Self {
        Self {
            vertices: mesh.vertices.iter().map(|v| v.to_array()).collect(),
            edges: mesh.edges.clone(),
            faces: mesh.faces.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StepInfo {
    index: usize,
    vertices: usize,
    edges: usize,
    faces: usize,
    has_view: bool,
    use_custom_timing: bool,
    show_edges: bool,
}

#[derive(Debug, Serialize)]
struct StatusExport {
    recording: bool,
    playing: bool,
    display_object: Option<String>,
    selected: Option<i64>,
    steps: Vec<StepInfo>,
    can_restore: bool,
}

/// Shaping recorder over an in-memory scene, driven from JavaScript.
///
/// The page mirrors edits into the scene with `set_mesh` and calls
/// `advance` from its animation loop; the recorder's timers run inside.
#[wasm_bindgen]
pub struct Recorder {
    session: Session,
    host: MemoryHost,
    clock: SimulatedClock,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl Recorder {
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new() -> Recorder {
        Recorder {
            session: Session::new(RecorderSettings::default()),
            host: MemoryHost::new(),
            clock: SimulatedClock::new(),
        }
    }

    /// Replace the settings; missing fields take their defaults.
    #[wasm_bindgen]
    pub fn set_settings(&mut self, settings: JsValue) -> Result<(), JsValue> {
        let settings: RecorderSettings =
            serde_wasm_bindgen::from_value(settings).map_err(to_js_error)?;
        self.session.set_settings(&settings);
        Ok(())
    }

    #[wasm_bindgen]
    pub fn get_settings(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.session.settings()).map_err(to_js_error)
    }

    /// Load recorder data previously returned by `save_data`.
    ///
    /// A running recording or playback is stopped first; the loaded data
    /// replaces whatever it would have saved.
    #[wasm_bindgen]
    pub fn load_data(&mut self, json: Option<String>) {
        if self.session.stop_activity(&mut self.host) {
            log::info!("stopped the running activity to load new data");
        }
        self.host.set_blob(json);
        self.session.attach(&mut self.host, &mut self.clock);
    }

    #[wasm_bindgen]
    pub fn save_data(&self) -> Option<String> {
        self.host.blob().map(str::to_owned)
    }

    #[wasm_bindgen]
    pub fn add_mesh(&mut self, name: &str, mesh: JsValue) -> Result<(), JsValue> {
        let mesh: MeshExport = serde_wasm_bindgen::from_value(mesh).map_err(to_js_error)?;
        self.host.add_mesh(name, mesh.into());
        Ok(())
    }

    /// Mirror an edit made on the page.
    #[wasm_bindgen]
    pub fn set_mesh(&mut self, name: &str, mesh: JsValue) -> Result<(), JsValue> {
        let mesh: MeshExport = serde_wasm_bindgen::from_value(mesh).map_err(to_js_error)?;
        self.host.set_mesh(name, mesh.into()).map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn get_mesh(&self, name: &str) -> Result<JsValue, JsValue> {
        let mesh = self
            .host
            .read_mesh(name)
            .ok_or_else(|| js_error(&format!("no mesh named `{name}`")))?;
        serde_wasm_bindgen::to_value(&MeshExport::from(&mesh)).map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn remove_object(&mut self, name: &str) -> bool {
        self.host.remove_object(name)
    }

    #[wasm_bindgen]
    pub fn set_active(&mut self, name: Option<String>) -> Result<(), JsValue> {
        self.host.set_active(name.as_deref()).map_err(to_js_error)?;
        self.session.on_active_object_changed(&self.host);
        Ok(())
    }

    #[wasm_bindgen]
    pub fn start_recording(&mut self) -> bool {
        self.session.start_recording(&mut self.host, &mut self.clock)
    }

    #[wasm_bindgen]
    pub fn stop_recording(&mut self) -> bool {
        self.session.stop_recording(&mut self.host)
    }

    /// Play in the configured mode; `export` writes one frame per tick.
    #[wasm_bindgen]
    pub fn play(&mut self, export: bool) -> bool {
        self.session.play(&mut self.host, &mut self.clock, export)
    }

    #[wasm_bindgen]
    pub fn stop_playing(&mut self) -> bool {
        self.session.stop_playing(&mut self.host)
    }

    /// Select a row of the step list; `-1` is the initial state.
    #[wasm_bindgen]
    pub fn select_step(&mut self, index: i32) -> bool {
        let Some(selection) = selection_from_row(index) else {
            return false;
        };
        self.session.select(&mut self.host, &mut self.clock, selection)
    }

    #[wasm_bindgen]
    pub fn delete_step(&mut self, index: usize) -> bool {
        self.session.delete_step(&mut self.host, index)
    }

    #[wasm_bindgen]
    pub fn restore_step(&mut self) -> bool {
        self.session.restore_step(&mut self.host)
    }

    #[wasm_bindgen]
    pub fn begin_view_reset(&mut self) -> bool {
        self.session.begin_view_reset()
    }

    #[wasm_bindgen]
    pub fn confirm_view_reset(&mut self) -> bool {
        self.session.confirm_view_reset(&mut self.host)
    }

    #[wasm_bindgen]
    pub fn set_start_from_selection(&mut self) -> bool {
        self.session.set_start_from_selection()
    }

    #[wasm_bindgen]
    pub fn set_end_from_selection(&mut self) -> bool {
        self.session.set_end_from_selection()
    }

    #[wasm_bindgen]
    pub fn mark_edges(&mut self, index: usize, edges: JsValue) -> Result<bool, JsValue> {
        let edges: Vec<[u32; 2]> = serde_wasm_bindgen::from_value(edges).map_err(to_js_error)?;
        Ok(self.session.mark_edges(&mut self.host, index, edges))
    }

    #[wasm_bindgen]
    pub fn toggle_show_edges(&mut self, index: usize) -> bool {
        self.session.toggle_show_edges(&mut self.host, index)
    }

    /// Run every timer due within the next `millis` milliseconds.
    #[wasm_bindgen]
    pub fn advance(&mut self, millis: f64) -> usize {
        let step = Duration::try_from_secs_f64(millis / 1000.0).unwrap_or_default();
        let limit = self.clock.now() + step;
        self.clock.run_until(&mut self.session, &mut self.host, limit)
    }

    #[wasm_bindgen]
    pub fn status(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.status_export()).map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }

    #[wasm_bindgen]
    pub fn is_playing(&self) -> bool {
        self.session.is_playing()
    }

    #[wasm_bindgen]
    pub fn shutdown(&mut self) {
        self.session.shutdown(&mut self.host);
    }
}

impl Recorder {
    fn status_export(&self) -> StatusExport {
        let steps = self
            .session
            .current_record()
            .map(|record| {
                record
                    .steps()
                    .iter()
                    .enumerate()
                    .map(|(index, step)| {
                        let (vertices, edges, faces) = step.snapshot.mesh.signature();
                        StepInfo {
                            index,
                            vertices,
                            edges,
                            faces,
                            has_view: step.snapshot.view.is_some(),
                            use_custom_timing: step.timing.use_custom,
                            show_edges: step.timing.show_edges,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        StatusExport {
            recording: self.session.is_recording(),
            playing: self.session.is_playing(),
            display_object: self.session.display_object().map(str::to_owned),
            selected: self.session.selection().map(|s| match s {
                Selection::Initial => -1,
                Selection::Step(i) => i64::try_from(i).unwrap_or(i64::MAX),
            }),
            steps,
            can_restore: self.session.can_restore_step(),
        }
    }
}

fn selection_from_row(index: i32) -> Option<Selection> {
    match index {
        -1 => Some(Selection::Initial),
        i => usize::try_from(i).ok().map(Selection::Step),
    }
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}
