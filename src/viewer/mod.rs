pub mod asset;
pub mod idle;
pub mod lighting;
pub mod normalize;
pub mod orbit;
pub mod renderer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eframe::{egui, egui_glow, glow};
use nalgebra::{Matrix4, Vector2, Vector3};

use crate::config::Config;
use crate::drop_zone::{self, DropZone, DropZoneEvent};
use crate::export;
use crate::form::PickedFile;
use crate::history::{GenerationResult, ResultId};
use crate::task::{self, Pending, TaskState};

use asset::{AssetError, SceneMesh};
use idle::IdleSpin;
use lighting::{Environment, EnvironmentError, Lighting};
use normalize::{Bounds, normalization};
use orbit::OrbitRig;
use renderer::{FrameUniforms, GpuScene};

pub const VIEWPORT_HEIGHT: f32 = 400.0;
const THUMBNAIL_SIZE: f32 = 96.0;
const PLACEHOLDER_FILL: egui::Color32 = egui::Color32::from_rgb(0xF5, 0xF5, 0xF4);

/// Where the viewer is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Decoding,
    Loading,
    Rendering,
    Error(String),
    Unmounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionKey {
    asset: ResultId,
    environment: u64,
}

struct Loaded {
    mesh: SceneMesh,
    bounds: Bounds,
    environment: Option<Result<Environment, EnvironmentError>>,
}

type LoadOutcome = Result<Loaded, AssetError>;

/// Everything acquired for one (result, environment) pair.
struct Session {
    key: SessionKey,
    asset: Arc<[u8]>,
    load: Option<Pending<LoadOutcome>>,
    /// CPU copy of the mesh, kept until it has been uploaded.
    scene: Option<SceneMesh>,
    normalization: Matrix4<f32>,
    lighting: Lighting,
    gpu: Option<Arc<Mutex<GpuScene>>>,
}

impl Session {
    fn is_displayable(&self) -> bool {
        self.scene.is_some() || self.gpu.is_some()
    }

    /// Phase this session puts the viewer in, if it is still healthy.
    fn live_phase(&self) -> Option<Phase> {
        if self.load.is_some() {
            Some(Phase::Loading)
        } else if self.is_displayable() {
            Some(Phase::Rendering)
        } else {
            None
        }
    }

    /// Releases every resource held by the session.
    fn release(mut self, gl: Option<&glow::Context>) {
        if self.load.take().is_some() {
            log::debug!("cancelling pending load of {:?}", self.key.asset);
        }
        self.scene = None;
        if let Some(gpu) = self.gpu.take() {
            match gl {
                Some(gl) => unsafe { lock(&gpu).destroy(gl) },
                None => log::warn!("no GL context at teardown, GPU objects of {:?} leak", self.key.asset),
            }
        }
        log::debug!("released viewer session for {:?}", self.key.asset);
    }
}

fn lock(scene: &Mutex<GpuScene>) -> MutexGuard<'_, GpuScene> {
    scene.lock().unwrap_or_else(PoisonError::into_inner)
}

fn load(asset: &[u8], environment: Option<&[u8]>) -> LoadOutcome {
    let mesh = asset::load_glb(asset)?;
    let bounds = mesh.bounds().ok_or(AssetError::NoGeometry)?;
    let environment = environment.map(Environment::from_hdr_bytes);
    Ok(Loaded {
        mesh,
        bounds,
        environment,
    })
}

fn spawn_load(asset: Arc<[u8]>, environment: Option<Arc<[u8]>>) -> Pending<LoadOutcome> {
    task::spawn(async move { load(&asset, environment.as_deref()) })
}

pub struct ModelViewer {
    target_size: f32,
    phase: Phase,
    session: Option<Session>,
    /// Key whose decode failed, so it is not retried every frame.
    failed: Option<SessionKey>,
    environment: Option<PickedFile>,
    environment_revision: u64,
    orbit: OrbitRig,
    spin: IdleSpin,
    environment_zone: DropZone,
}

impl ModelViewer {
    pub fn new(config: &Config) -> Self {
        Self {
            target_size: config.target_size,
            phase: Phase::Idle,
            session: None,
            failed: None,
            environment: None,
            environment_revision: 0,
            orbit: OrbitRig::default(),
            spin: IdleSpin::new(config.auto_rotate_step, config.drag_grace_secs()),
            environment_zone: DropZone::new(drop_zone::ENVIRONMENT_MAP),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Swaps the environment map. The next [`ModelViewer::sync`] rebuilds the
    /// scene from scratch.
    pub fn set_environment(&mut self, file: Option<PickedFile>) {
        match &file {
            Some(file) => log::info!("environment map set to {}", file.name),
            None => log::info!("environment map cleared"),
        }
        self.environment = file;
        self.environment_revision += 1;
    }

    /// Bytes of the asset currently held by the viewer.
    pub fn decoded_asset(&self) -> Option<&Arc<[u8]>> {
        self.session.as_ref().map(|s| &s.asset)
    }

    pub fn lighting(&self) -> Option<&Lighting> {
        self.session
            .as_ref()
            .filter(|s| s.is_displayable())
            .map(|s| &s.lighting)
    }

    /// Whether a model is on screen and the animation loop should run.
    pub fn is_rendering(&self) -> bool {
        self.phase != Phase::Unmounted && self.session.as_ref().is_some_and(Session::is_displayable)
    }

    /// Starts a new session when the (result, environment) pair changed.
    pub fn sync(&mut self, result: Option<&GenerationResult>, gl: Option<&glow::Context>) {
        if self.phase == Phase::Unmounted {
            return;
        }
        let Some(result) = result else {
            return;
        };
        let key = SessionKey {
            asset: result.id(),
            environment: self.environment_revision,
        };
        if let Some(session) = self.session.as_ref().filter(|s| s.key == key) {
            // Back on the model that is still displayed after a failed one.
            if let Some(phase) = session.live_phase() {
                self.phase = phase;
            }
            self.failed = None;
            return;
        }
        if self.failed == Some(key) {
            return;
        }

        self.phase = Phase::Decoding;
        let asset = match asset::decode_payload(&result.encoded_asset) {
            Ok(bytes) => bytes,
            Err(err) => {
                // The previous model, if any, stays on screen.
                log::error!("could not decode model {:?}: {err}", key.asset);
                self.failed = Some(key);
                self.phase = Phase::Error(err.to_string());
                return;
            }
        };

        self.teardown(gl);
        self.failed = None;
        log::info!("loading model {:?} ({} bytes)", key.asset, asset.len());
        let environment = self.environment.as_ref().map(|f| f.data.clone());
        let load = spawn_load(asset.clone(), environment);
        self.session = Some(Session {
            key,
            asset,
            load: Some(load),
            scene: None,
            normalization: Matrix4::identity(),
            lighting: Lighting::default(),
            gpu: None,
        });
        self.spin.reset();
        self.orbit.reset();
        self.phase = Phase::Loading;
    }

    /// Picks up a finished background load.
    pub fn poll(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(pending) = session.load.as_mut() else {
            return;
        };
        match pending.poll() {
            TaskState::Running => {}
            TaskState::Ready(Ok(loaded)) => {
                session.load = None;
                let Loaded {
                    mesh,
                    bounds,
                    environment,
                } = loaded;
                session.normalization = normalization(&bounds, self.target_size);
                session.lighting = match environment {
                    Some(Ok(env)) => Lighting::Image(Arc::new(env)),
                    Some(Err(err)) => {
                        log::error!("environment map rejected, using the default light rig: {err}");
                        Lighting::default()
                    }
                    None => Lighting::default(),
                };
                log::info!(
                    "model {:?} ready: {} triangles",
                    session.key.asset,
                    mesh.triangle_count()
                );
                session.scene = Some(mesh);
                self.phase = Phase::Rendering;
            }
            TaskState::Ready(Err(err)) => {
                session.load = None;
                log::error!("could not parse model {:?}: {err}", session.key.asset);
                self.phase = Phase::Error(err.to_string());
            }
            TaskState::Lost => {
                session.load = None;
                log::error!("model loader for {:?} stopped unexpectedly", session.key.asset);
                self.phase = Phase::Error("model loader stopped unexpectedly".to_owned());
            }
        }
    }

    /// Uploads a freshly loaded mesh once a GL context is available.
    fn ensure_gpu(&mut self, gl: Option<&glow::Context>) {
        let Some(gl) = gl else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.gpu.is_some() {
            return;
        }
        let Some(mesh) = session.scene.take() else {
            return;
        };
        match unsafe { GpuScene::new(gl, &mesh, &session.lighting) } {
            Ok(scene) => session.gpu = Some(Arc::new(Mutex::new(scene))),
            Err(err) => {
                log::error!("could not upload model {:?}: {err}", session.key.asset);
                self.phase = Phase::Error(err.to_string());
            }
        }
    }

    /// One animation frame. Returns `false` once the loop should stop.
    pub fn frame(&mut self, now: f64) -> bool {
        if !self.is_rendering() {
            return false;
        }
        self.orbit.update();
        self.spin.advance(now);
        true
    }

    /// Follows the pointer grab on the viewport. Pressing suspends the spin
    /// right away, before any motion is detected.
    pub fn set_grabbed(&mut self, grabbed: bool, now: f64) {
        match (grabbed, self.spin.is_dragging()) {
            (true, false) => self.spin.begin_drag(),
            (false, true) => self.spin.end_drag(now),
            _ => {}
        }
    }

    /// Model transform: idle spin around +Y after normalization.
    pub fn model_matrix(&self) -> Matrix4<f32> {
        let normalization = self
            .session
            .as_ref()
            .map_or_else(Matrix4::identity, |s| s.normalization);
        Matrix4::from_axis_angle(&Vector3::y_axis(), self.spin.angle()) * normalization
    }

    fn frame_uniforms(&self) -> FrameUniforms {
        let model = self.model_matrix();
        let view_proj = self.orbit.view_projection();
        FrameUniforms {
            mvp: view_proj * model,
            model,
            eye: self.orbit.eye(),
            inv_view_proj: view_proj.try_inverse().unwrap_or_else(Matrix4::identity),
        }
    }

    fn teardown(&mut self, gl: Option<&glow::Context>) {
        if let Some(session) = self.session.take() {
            session.release(gl);
        }
    }

    /// Releases everything and stops the animation loop for good.
    pub fn unmount(&mut self, gl: Option<&glow::Context>) {
        self.teardown(gl);
        self.failed = None;
        self.phase = Phase::Unmounted;
        log::info!("viewer unmounted");
    }

    pub fn ui(
        &mut self,
        ui: &mut egui::Ui,
        result: Option<&Arc<GenerationResult>>,
        thumbnail: Option<&egui::TextureHandle>,
        gl: Option<&Arc<glow::Context>>,
    ) {
        let gl = gl.map(|gl| &**gl);
        self.sync(result.map(|r| &**r), gl);
        self.poll();
        self.ensure_gpu(gl);

        let now = ui.input(|i| i.time);
        let size = egui::vec2(ui.available_width(), VIEWPORT_HEIGHT);
        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click_and_drag());
        self.orbit.set_viewport(rect.width(), rect.height());

        self.set_grabbed(response.is_pointer_button_down_on(), now);
        if response.dragged() {
            let d = response.drag_delta();
            let delta = Vector2::new(d.x, d.y);
            if response.dragged_by(egui::PointerButton::Secondary) {
                self.orbit.pan(delta, rect.height());
            } else {
                self.orbit.rotate(delta, rect.height());
            }
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);
            if scroll != 0.0 {
                self.orbit.zoom(scroll / 50.0);
            }
        }

        let animating = self.frame(now);
        let gpu = self.session.as_ref().and_then(|s| s.gpu.clone());
        match gpu {
            Some(gpu) if animating => {
                let uniforms = self.frame_uniforms();
                let callback = egui_glow::CallbackFn::new(move |_info, painter| {
                    let scene = lock(&gpu);
                    unsafe { scene.paint(painter.gl(), &uniforms) }
                });
                ui.painter().add(egui::PaintCallback {
                    rect,
                    callback: Arc::new(callback),
                });
            }
            _ => self.placeholder(ui, rect),
        }

        if let Some(texture) = thumbnail {
            let thumb_rect = egui::Rect::from_min_size(
                rect.right_bottom() - egui::vec2(THUMBNAIL_SIZE + 12.0, THUMBNAIL_SIZE + 12.0),
                egui::vec2(THUMBNAIL_SIZE, THUMBNAIL_SIZE),
            );
            egui::Image::new((texture.id(), thumb_rect.size()))
                .rounding(8.0)
                .paint_at(ui, thumb_rect);
        }

        if animating || matches!(self.phase, Phase::Decoding | Phase::Loading) {
            ui.ctx().request_repaint();
        }

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let asset = self.decoded_asset().cloned();
            if ui
                .add_enabled(asset.is_some(), egui::Button::new("Download model"))
                .clicked()
            {
                if let Some(bytes) = asset {
                    if let Err(err) = export::download_model(&bytes) {
                        log::error!("model download failed: {err}");
                    }
                }
            }
            if ui
                .add_enabled(result.is_some(), egui::Button::new("Download thumbnail"))
                .clicked()
            {
                if let Some(result) = result {
                    if let Err(err) = export::download_thumbnail(ui.ctx(), &result.thumbnail_url) {
                        log::error!("thumbnail download failed: {err}");
                    }
                }
            }
        });

        ui.add_space(4.0);
        match self.environment_zone.ui(ui, self.environment.as_ref(), false) {
            Some(DropZoneEvent::Selected(file)) => self.set_environment(Some(file)),
            Some(DropZoneEvent::Removed) => self.set_environment(None),
            None => {}
        }
    }

    fn placeholder(&self, ui: &mut egui::Ui, rect: egui::Rect) {
        ui.painter().rect_filled(rect, 8.0, PLACEHOLDER_FILL);
        let text = match &self.phase {
            Phase::Error(_) => "This model could not be displayed",
            Phase::Unmounted => "",
            _ => "Loading model…",
        };
        let color = match self.phase {
            Phase::Error(_) => ui.visuals().error_fg_color,
            _ => egui::Color32::from_gray(120),
        };
        ui.painter().text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            text,
            egui::FontId::proportional(16.0),
            color,
        );
    }
}
