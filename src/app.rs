use std::time::Duration;

use eframe::{egui, glow};

use crate::api::{ApiClient, ApiError, EXAMPLE_PATH, GenerationRequest, GenerationResponse};
use crate::catalog;
use crate::config::Config;
use crate::drop_zone::{self, DropZone, DropZoneEvent};
use crate::shell::Shell;
use crate::task::{self, Pending, TaskState};
use crate::thumbnail::ThumbnailCache;
use crate::viewer::ModelViewer;

const SUBMIT_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Enter);

type Request = Pending<Result<GenerationResponse, ApiError>>;

pub struct PrismApp {
    api: ApiClient,
    shell: Shell,
    viewer: ModelViewer,
    image_zone: DropZone,
    thumbnails: ThumbnailCache,
    example: Option<Request>,
    submission: Option<Request>,
}

impl PrismApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::light());
        Self::with_config(Config::from_env())
    }

    /// Builds the app and starts fetching the example model.
    pub fn with_config(config: Config) -> Self {
        let api = ApiClient::new(&config);
        log::info!("fetching example model from {}", api.url(EXAMPLE_PATH));
        let example = {
            let api = api.clone();
            task::spawn(async move { api.fetch_example().await })
        };

        Self {
            shell: Shell::new(&config),
            viewer: ModelViewer::new(&config),
            image_zone: DropZone::new(drop_zone::IMAGE_INPUT),
            thumbnails: ThumbnailCache::default(),
            example: Some(example),
            submission: None,
            api,
        }
    }

    fn submit(&mut self, now: f64) {
        if let Some(request) = self.shell.begin_submit(now) {
            self.send(request);
        }
    }

    fn send(&mut self, request: GenerationRequest) {
        let api = self.api.clone();
        self.submission = Some(task::spawn(async move { api.generate(request).await }));
    }

    fn poll_requests(&mut self, now: f64) {
        if let Some(pending) = self.example.as_mut() {
            match pending.poll() {
                TaskState::Running => {}
                TaskState::Ready(outcome) => {
                    self.example = None;
                    self.shell.finish_example(outcome);
                }
                TaskState::Lost => {
                    self.example = None;
                    log::error!("example fetch stopped without an answer");
                }
            }
        }

        if let Some(pending) = self.submission.as_mut() {
            let outcome = match pending.poll() {
                TaskState::Running => return,
                TaskState::Ready(outcome) => outcome,
                TaskState::Lost => Err(ApiError::Transport("request stopped without an answer".to_owned())),
            };
            self.submission = None;
            self.shell.finish_submit(outcome, now);
        }
    }

    fn header_ui(ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Prism");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Login").clicked() {
                    log::info!("login is not available yet");
                }
                if ui.button("Settings").clicked() {
                    log::info!("settings are not available yet");
                }
            });
        });
    }

    fn form_ui(&mut self, ui: &mut egui::Ui, now: f64) {
        ui.heading("Generate from Text or Image");
        ui.add_space(12.0);

        let has_image = self.shell.form().image().is_some();
        ui.label("Generate from Text");
        let mut text = self.shell.form().text().to_owned();
        let edit = ui.add_enabled(
            !has_image,
            egui::TextEdit::singleline(&mut text)
                .hint_text("Enter your text here")
                .desired_width(f32::INFINITY),
        );
        if edit.changed() {
            self.shell.set_text(text);
        }

        ui.add_space(8.0);
        ui.vertical_centered(|ui| {
            ui.weak("OR");
        });
        ui.add_space(8.0);

        ui.label("Generate from Image");
        let selected = self.shell.form().image().cloned();
        let has_text = !self.shell.form().text().is_empty();
        match self.image_zone.ui(ui, selected.as_ref(), has_text) {
            Some(DropZoneEvent::Selected(file)) => {
                log::info!("image selected: {} ({})", file.name, file.mime);
                self.shell.set_image(file);
            }
            Some(DropZoneEvent::Removed) => self.shell.remove_image(),
            None => {}
        }

        ui.add_space(16.0);
        let busy = self.shell.is_busy();
        let hint = shortcut_hint(ui.ctx().os());
        ui.horizontal(|ui| {
            let label = if busy { "Generating…" } else { "Generate" };
            let button = egui::Button::new(label).min_size(egui::vec2(160.0, 32.0));
            if ui.add_enabled(!busy, button).clicked() {
                self.submit(now);
            }
            if busy {
                ui.spinner();
            }
            ui.weak(hint);
        });
    }
}

/// Submits when the Cmd/Ctrl+Enter chord was pressed this frame. Must run
/// before any widget, so a focused text field never sees the Enter key.
fn submit_shortcut(ctx: &egui::Context, shell: &mut Shell, now: f64) -> Option<GenerationRequest> {
    if ctx.input_mut(|i| i.consume_shortcut(&SUBMIT_SHORTCUT)) {
        shell.begin_submit(now)
    } else {
        None
    }
}

/// Label advertising the submit chord for the host platform.
fn shortcut_hint(os: egui::os::OperatingSystem) -> &'static str {
    match os {
        egui::os::OperatingSystem::Mac | egui::os::OperatingSystem::IOS => "(Cmd + Enter)",
        _ => "(Ctrl + Enter)",
    }
}

impl eframe::App for PrismApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let now = ctx.input(|i| i.time);
        self.poll_requests(now);
        if self.example.is_some() || self.submission.is_some() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        if let Some(request) = submit_shortcut(ctx, &mut self.shell, now) {
            self.send(request);
        }

        // ------------------------------------------------------------------
        // Header
        // ------------------------------------------------------------------
        egui::TopBottomPanel::top("header").show(ctx, Self::header_ui);

        // ------------------------------------------------------------------
        // Form
        // ------------------------------------------------------------------
        egui::SidePanel::left("form_panel")
            .resizable(false)
            .min_width(320.0)
            .show(ctx, |ui| self.form_ui(ui, now));

        // ------------------------------------------------------------------
        // Viewer + catalog
        // ------------------------------------------------------------------
        egui::CentralPanel::default().show(ctx, |ui| {
            let current = self.shell.current().cloned();
            let thumbnail = current
                .as_ref()
                .and_then(|result| self.thumbnails.texture(ctx, &self.api, result))
                .cloned();
            self.viewer
                .ui(ui, current.as_ref(), thumbnail.as_ref(), frame.gl());

            ui.separator();
            let picked = catalog::ui(
                ui,
                self.shell.history().entries(),
                self.shell.current_id(),
                &mut self.thumbnails,
                &self.api,
            );
            if let Some(id) = picked {
                self.shell.select(id);
            }
        });

        self.shell.notification_mut().ui(ctx);
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        self.viewer.unmount(gl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::NO_INPUT_MESSAGE;

    fn prompt_id() -> egui::Id {
        egui::Id::new("prompt")
    }

    fn chord() -> egui::Event {
        egui::Event::Key {
            key: egui::Key::Enter,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers: egui::Modifiers {
                ctrl: true,
                command: true,
                ..Default::default()
            },
        }
    }

    /// One frame laid out like `update`: the chord first, then a text field.
    fn run_frame(ctx: &egui::Context, shell: &mut Shell, events: Vec<egui::Event>, focus: bool) -> Vec<GenerationRequest> {
        let mut sent = Vec::new();
        let input = egui::RawInput {
            events,
            ..Default::default()
        };
        let _ = ctx.run(input, |ctx| {
            let now = ctx.input(|i| i.time);
            sent.extend(submit_shortcut(ctx, shell, now));
            egui::CentralPanel::default().show(ctx, |ui| {
                let mut text = shell.form().text().to_owned();
                let edit = ui.add(egui::TextEdit::singleline(&mut text).id(prompt_id()));
                if focus {
                    edit.request_focus();
                }
            });
        });
        sent
    }

    #[test]
    fn chord_on_empty_form_notifies_without_sending() {
        let ctx = egui::Context::default();
        let mut shell = Shell::new(&Config::default());
        run_frame(&ctx, &mut shell, vec![], true);
        assert!(ctx.memory(|m| m.has_focus(prompt_id())));

        let sent = run_frame(&ctx, &mut shell, vec![chord()], false);
        assert!(sent.is_empty());
        assert!(!shell.is_busy());
        assert_eq!(shell.notification().message(), NO_INPUT_MESSAGE);
        // The field never saw the Enter key, so it kept focus.
        assert!(ctx.memory(|m| m.has_focus(prompt_id())));
    }

    #[test]
    fn chord_while_busy_sends_only_once() {
        let ctx = egui::Context::default();
        let mut shell = Shell::new(&Config::default());
        shell.set_text("a red chair".to_owned());
        run_frame(&ctx, &mut shell, vec![], true);

        let sent = run_frame(&ctx, &mut shell, vec![chord()], false);
        assert_eq!(sent, vec![GenerationRequest::Text("a red chair".into())]);
        assert!(shell.is_busy());

        let again = run_frame(&ctx, &mut shell, vec![chord(), chord()], false);
        assert!(again.is_empty());
        assert!(shell.is_busy());
        assert!(!shell.notification().is_visible());
    }

    #[test]
    fn plain_enter_does_not_submit() {
        let ctx = egui::Context::default();
        let mut shell = Shell::new(&Config::default());
        shell.set_text("a red chair".to_owned());
        let enter = egui::Event::Key {
            key: egui::Key::Enter,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers: egui::Modifiers::NONE,
        };
        let sent = run_frame(&ctx, &mut shell, vec![enter], true);
        assert!(sent.is_empty());
        assert!(!shell.is_busy());
    }

    #[test]
    fn shortcut_hint_matches_platform_modifier() {
        assert_eq!(shortcut_hint(egui::os::OperatingSystem::Mac), "(Cmd + Enter)");
        assert_eq!(shortcut_hint(egui::os::OperatingSystem::Windows), "(Ctrl + Enter)");
        assert_eq!(shortcut_hint(egui::os::OperatingSystem::Nix), "(Ctrl + Enter)");
    }
}
