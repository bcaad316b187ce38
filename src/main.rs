#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    prism_ui::run_native()
}

// The web build starts from `prism_ui::start`.
#[cfg(target_arch = "wasm32")]
fn main() {}
