pub mod api;
mod app;
pub mod catalog;
pub mod config;
pub mod drop_zone;
pub mod export;
pub mod form;
pub mod history;
pub mod notification;
pub mod shell;
pub mod task;
pub mod thumbnail;
pub mod viewer;

pub use app::PrismApp;

// ── Web entry‑point ──
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Must match the `<canvas>` id in index.html.
#[cfg(target_arch = "wasm32")]
const CANVAS_ID: &str = "prism_canvas";

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    // Redirect `log` macros & panic messages to the browser console
    eframe::WebLogger::init(log::LevelFilter::Debug).ok();
    console_error_panic_hook::set_once();

    let canvas = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(CANVAS_ID))
        .ok_or_else(|| JsValue::from_str("canvas element not found"))?
        .dyn_into::<web_sys::HtmlCanvasElement>()?;

    let web_options = eframe::WebOptions {
        depth_buffer: 24,
        ..Default::default()
    };

    eframe::WebRunner::new()
        .start(
            canvas,
            web_options,
            Box::new(|cc| Ok(Box::new(PrismApp::new(cc)))),
        )
        .await?;

    Ok(())
}

// ── Native entry‑point ──
#[cfg(not(target_arch = "wasm32"))]
pub fn run_native() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = eframe::NativeOptions {
        depth_buffer: 24,
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("Prism")
            .with_inner_size([1200.0, 780.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Prism",
        options,
        Box::new(|cc| Ok(Box::new(PrismApp::new(cc)))),
    )
}
