use std::sync::Arc;

use eframe::egui;

use crate::api::ApiClient;
use crate::history::{GenerationResult, ResultId};
use crate::thumbnail::ThumbnailCache;

pub const THUMB_SIZE: f32 = 80.0;

/// Highlighting is by identity, never by position.
pub fn is_current(entry: &GenerationResult, current: Option<ResultId>) -> bool {
    current == Some(entry.id())
}

/// Draws the catalog; returns the entry the user clicked, if any.
pub fn ui(
    ui: &mut egui::Ui,
    entries: &[Arc<GenerationResult>],
    current: Option<ResultId>,
    thumbnails: &mut ThumbnailCache,
    api: &ApiClient,
) -> Option<ResultId> {
    let mut selected = None;
    if entries.is_empty() {
        return selected;
    }

    egui::ScrollArea::horizontal()
        .id_salt("catalog")
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                for (index, entry) in entries.iter().enumerate() {
                    let size = egui::vec2(THUMB_SIZE, THUMB_SIZE);
                    let response = match thumbnails.texture(ui.ctx(), api, entry) {
                        Some(texture) => ui.add(
                            egui::Image::new((texture.id(), size))
                                .rounding(8.0)
                                .sense(egui::Sense::click()),
                        ),
                        None => ui.add_sized(size, egui::Button::new(format!("#{}", index + 1))),
                    }
                    .on_hover_text(format!("Generation {}", index + 1));

                    let stroke = if is_current(entry, current) {
                        egui::Stroke::new(3.0, ui.visuals().selection.bg_fill)
                    } else {
                        egui::Stroke::new(1.0, ui.visuals().widgets.noninteractive.bg_stroke.color)
                    };
                    ui.painter().rect_stroke(response.rect, 8.0, stroke);

                    if response.clicked() {
                        selected = Some(entry.id());
                    }
                }
            });
        });

    if let Some(id) = selected {
        log::debug!("catalog selected {id:?}");
    }
    selected
}
