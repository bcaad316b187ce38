use eframe::egui;

use crate::form::PickedFile;
use crate::task::{self, Pending, TaskState};

/// What to do when several files are dropped at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiDrop {
    Reject,
    TakeFirst,
}

#[derive(Debug, Clone)]
pub struct DropZoneConfig {
    pub id: &'static str,
    /// MIME types (`image/png`), wildcards (`image/*`) or extensions (`.hdr`).
    pub accept: &'static [&'static str],
    /// Name and extensions shown in the native file dialog.
    pub filter_name: &'static str,
    pub extensions: &'static [&'static str],
    /// Compact single-line presentation.
    pub small: bool,
    pub multiple: MultiDrop,
    pub hint: &'static str,
    pub hover_text: &'static str,
    /// Claims drops whose pointer position the host could not report.
    pub primary: bool,
}

pub const IMAGE_INPUT: DropZoneConfig = DropZoneConfig {
    id: "image_input",
    accept: &["image/*"],
    filter_name: "Images (png, jpg)",
    extensions: &["png", "jpg", "jpeg"],
    small: false,
    multiple: MultiDrop::Reject,
    hint: "Supports PNG, JPG, JPEG",
    hover_text: "Drop image here",
    primary: true,
};

pub const ENVIRONMENT_MAP: DropZoneConfig = DropZoneConfig {
    id: "environment_map",
    accept: &[".hdr", "image/vnd.radiance"],
    filter_name: "Environment map (hdr)",
    extensions: &["hdr"],
    small: true,
    multiple: MultiDrop::Reject,
    hint: "Environment map (.hdr)",
    hover_text: "Drop environment map here",
    primary: false,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DropZoneEvent {
    Selected(PickedFile),
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("picker is disabled")]
    Disabled,
    #[error("nothing was dropped")]
    Nothing,
    #[error("{0} files dropped, only one is accepted")]
    TooMany(usize),
    #[error("{name} ({mime}) is not an accepted file type")]
    WrongType { name: String, mime: String },
}

/// Whether `file` matches any of the accept patterns.
pub fn accepts(patterns: &[&str], file: &PickedFile) -> bool {
    patterns.iter().any(|pattern| {
        if let Some(ext) = pattern.strip_prefix('.') {
            file.name
                .rsplit_once('.')
                .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext))
        } else if let Some(top) = pattern.strip_suffix("/*") {
            file.mime
                .split_once('/')
                .is_some_and(|(t, _)| t.eq_ignore_ascii_case(top))
        } else {
            file.mime.eq_ignore_ascii_case(pattern)
        }
    })
}

/// Applies the zone's rules to a batch of incoming files.
pub fn choose(config: &DropZoneConfig, files: Vec<PickedFile>, disabled: bool) -> Result<PickedFile, Rejection> {
    if disabled {
        return Err(Rejection::Disabled);
    }
    let count = files.len();
    if count > 1 && config.multiple == MultiDrop::Reject {
        return Err(Rejection::TooMany(count));
    }
    let file = files.into_iter().next().ok_or(Rejection::Nothing)?;
    if !accepts(config.accept, &file) {
        return Err(Rejection::WrongType {
            name: file.name,
            mime: file.mime,
        });
    }
    Ok(file)
}

pub struct DropZone {
    config: DropZoneConfig,
    picking: Option<Pending<Option<PickedFile>>>,
}

impl DropZone {
    pub fn new(config: DropZoneConfig) -> Self {
        Self {
            config,
            picking: None,
        }
    }

    /// Draws the zone; returns at most one event per frame.
    pub fn ui(&mut self, ui: &mut egui::Ui, selected: Option<&PickedFile>, disabled: bool) -> Option<DropZoneEvent> {
        let mut event = self.poll_dialog(ui.ctx(), disabled);

        let height = if self.config.small { 44.0 } else { 120.0 };
        let sense = if disabled {
            egui::Sense::hover()
        } else {
            egui::Sense::click()
        };
        let (rect, response) = ui.allocate_exact_size(egui::vec2(ui.available_width(), height), sense);

        let (hovering_files, dropped, pointer) = ui.input(|i| {
            (
                !i.raw.hovered_files.is_empty(),
                i.raw.dropped_files.clone(),
                i.pointer.hover_pos(),
            )
        });
        let over = pointer.map_or(self.config.primary, |p| rect.contains(p));
        let drag_active = hovering_files && over && !disabled;

        if !dropped.is_empty() && over {
            let files = dropped.into_iter().filter_map(read_dropped).collect();
            event = event.or_else(|| self.offer(files, disabled));
        }

        self.paint(ui, rect, drag_active, disabled, selected);

        if let Some(file) = selected {
            let label = format!("Selected: {}", file.name);
            let button_rect = egui::Rect::from_center_size(
                rect.right_center() - egui::vec2(20.0, 0.0),
                egui::vec2(24.0, 24.0),
            );
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                label,
                egui::FontId::proportional(13.0),
                ui.visuals().text_color(),
            );
            if ui
                .put(button_rect, egui::Button::new("✕").small())
                .on_hover_text("Remove")
                .clicked()
            {
                event = Some(DropZoneEvent::Removed);
            }
        }

        if response.clicked() && self.picking.is_none() {
            log::debug!("{}: opening file dialog", self.config.id);
            self.picking = Some(task::spawn(pick_file(self.config.filter_name, self.config.extensions)));
        }
        if response.hovered() && !disabled {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        event
    }

    fn poll_dialog(&mut self, ctx: &egui::Context, disabled: bool) -> Option<DropZoneEvent> {
        let pending = self.picking.as_mut()?;
        match pending.poll() {
            TaskState::Running => {
                ctx.request_repaint_after(std::time::Duration::from_millis(100));
                None
            }
            TaskState::Ready(file) => {
                self.picking = None;
                self.offer(file.into_iter().collect(), disabled)
            }
            TaskState::Lost => {
                self.picking = None;
                None
            }
        }
    }

    fn offer(&self, files: Vec<PickedFile>, disabled: bool) -> Option<DropZoneEvent> {
        match choose(&self.config, files, disabled) {
            Ok(file) => Some(DropZoneEvent::Selected(file)),
            Err(rejection) => {
                log::warn!("{}: {rejection}", self.config.id);
                None
            }
        }
    }

    fn paint(&self, ui: &egui::Ui, rect: egui::Rect, drag_active: bool, disabled: bool, selected: Option<&PickedFile>) {
        let visuals = ui.visuals();
        let accent = visuals.selection.bg_fill;
        let mut border = if drag_active {
            accent
        } else {
            visuals.widgets.noninteractive.bg_stroke.color
        };
        if disabled {
            border = border.gamma_multiply(0.5);
        }
        if drag_active {
            ui.painter().rect_filled(rect, 8.0, accent.gamma_multiply(0.15));
        }

        let r = rect.shrink(1.0);
        let outline = [r.left_top(), r.right_top(), r.right_bottom(), r.left_bottom(), r.left_top()];
        ui.painter()
            .extend(egui::Shape::dashed_line(&outline, egui::Stroke::new(2.0, border), 6.0, 4.0));

        if selected.is_some() && !drag_active {
            return;
        }
        let mut text_color = visuals.weak_text_color();
        if disabled {
            text_color = text_color.gamma_multiply(0.5);
        }
        let text = if drag_active {
            self.config.hover_text.to_owned()
        } else if self.config.small {
            format!("{} - click or drop", self.config.hint)
        } else {
            format!("Click to upload or drag and drop\n{}", self.config.hint)
        };
        ui.painter().text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            text,
            egui::FontId::proportional(14.0),
            text_color,
        );
    }
}

async fn pick_file(filter_name: &'static str, extensions: &'static [&'static str]) -> Option<PickedFile> {
    let handle = rfd::AsyncFileDialog::new()
        .add_filter(filter_name, extensions)
        .pick_file()
        .await?;
    let data = handle.read().await;
    Some(PickedFile::new(handle.file_name(), "", data))
}

fn read_dropped(file: egui::DroppedFile) -> Option<PickedFile> {
    if let Some(bytes) = file.bytes {
        return Some(PickedFile::new(file.name, file.mime, bytes));
    }
    let path = file.path?;
    let name = if file.name.is_empty() {
        path.file_name()?.to_string_lossy().into_owned()
    } else {
        file.name
    };
    match std::fs::read(&path) {
        Ok(data) => Some(PickedFile::new(name, file.mime, data)),
        Err(err) => {
            log::warn!("could not read dropped file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> PickedFile {
        PickedFile::new(name, "", vec![0u8; 4])
    }

    #[test]
    fn wildcard_and_extension_patterns() {
        assert!(accepts(&["image/*"], &file("photo.JPG")));
        assert!(accepts(&["image/*"], &file("photo.png")));
        assert!(!accepts(&["image/*"], &file("notes.txt")));
        assert!(accepts(&[".hdr"], &file("studio.HDR")));
        assert!(!accepts(&[".hdr"], &file("studio.exr")));
        assert!(accepts(&["image/png"], &PickedFile::new("blob", "image/png", vec![0u8])));
    }

    #[test]
    fn single_conforming_file_is_selected() {
        let chosen = choose(&IMAGE_INPUT, vec![file("chair.png")], false).unwrap();
        assert_eq!(chosen.name, "chair.png");
    }

    #[test]
    fn multi_file_drop_is_rejected_or_trimmed() {
        let files = vec![file("a.png"), file("b.png")];
        assert_eq!(choose(&IMAGE_INPUT, files.clone(), false), Err(Rejection::TooMany(2)));

        let take_first = DropZoneConfig {
            multiple: MultiDrop::TakeFirst,
            ..IMAGE_INPUT
        };
        assert_eq!(choose(&take_first, files, false).unwrap().name, "a.png");
    }

    #[test]
    fn disabled_zone_rejects_everything() {
        assert_eq!(choose(&IMAGE_INPUT, vec![file("a.png")], true), Err(Rejection::Disabled));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = choose(&ENVIRONMENT_MAP, vec![file("chair.png")], false).unwrap_err();
        assert!(matches!(err, Rejection::WrongType { .. }));
        assert!(choose(&ENVIRONMENT_MAP, vec![file("sky.hdr")], false).is_ok());
    }

    #[test]
    fn empty_drop_is_nothing() {
        assert_eq!(choose(&IMAGE_INPUT, Vec::new(), false), Err(Rejection::Nothing));
    }
}
