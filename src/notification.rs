use std::time::Duration;

use eframe::egui;

pub const DEFAULT_DURATION: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone)]
pub struct Notification {
    message: String,
    visible: bool,
    duration: f64,
    /// `(armed_at, deadline)` while a dismissal is pending.
    timer: Option<(f64, f64)>,
}

impl Default for Notification {
    fn default() -> Self {
        Self::with_duration(DEFAULT_DURATION)
    }
}

impl Notification {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            message: String::new(),
            visible: false,
            duration: duration.as_secs_f64(),
            timer: None,
        }
    }

    /// Displays `message` and (re-)arms the dismissal timer.
    pub fn show(&mut self, message: impl Into<String>, now: f64) {
        self.message = message.into();
        self.visible = true;
        self.timer = Some((now, now + self.duration));
    }

    /// Hides the banner and disarms any pending timer.
    pub fn hide(&mut self) {
        self.visible = false;
        self.timer = None;
    }

    /// Advances the timer; returns `true` exactly once per arming, when the
    /// banner closes itself.
    pub fn tick(&mut self, now: f64) -> bool {
        match self.timer {
            Some((_, deadline)) if self.visible && now >= deadline => {
                self.hide();
                true
            }
            _ => false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Fraction of the display time still left, 1.0 right after `show`.
    pub fn progress(&self, now: f64) -> f32 {
        match self.timer {
            Some((armed, deadline)) if deadline > armed => {
                (((deadline - now) / (deadline - armed)).clamp(0.0, 1.0)) as f32
            }
            _ => 0.0,
        }
    }

    /// Draws the banner (if visible) at the top centre of the screen and
    /// schedules a repaint for when it should close.
    pub fn ui(&mut self, ctx: &egui::Context) {
        let now = ctx.input(|i| i.time);
        if self.tick(now) {
            log::debug!("notification dismissed");
        }
        if !self.visible {
            return;
        }

        egui::Area::new(egui::Id::new("notification"))
            .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 16.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_min_width(240.0);
                    ui.label(egui::RichText::new(&self.message).strong());
                    let width = ui.available_width() * self.progress(now);
                    let (rect, _) =
                        ui.allocate_exact_size(egui::vec2(ui.available_width(), 3.0), egui::Sense::hover());
                    let bar = egui::Rect::from_min_size(rect.min, egui::vec2(width, rect.height()));
                    ui.painter().rect_filled(bar, 1.5, ui.visuals().selection.bg_fill);
                });
            });

        // the bar is animated, so keep frames coming while it drains
        ctx.request_repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_after_duration_exactly_once() {
        let mut note = Notification::default();
        note.show("Please enter text or upload an image.", 10.0);
        assert!(!note.tick(13.9));
        assert!(note.is_visible());
        assert!(note.tick(14.0));
        assert!(!note.is_visible());
        assert!(!note.tick(20.0));
    }

    #[test]
    fn showing_again_rearms_the_timer() {
        let mut note = Notification::with_duration(Duration::from_secs(2));
        note.show("first", 0.0);
        note.show("second", 1.5);
        assert!(!note.tick(2.5));
        assert_eq!(note.message(), "second");
        assert!(note.tick(3.5));
    }

    #[test]
    fn hidden_banner_never_fires() {
        let mut note = Notification::default();
        note.show("bye", 0.0);
        note.hide();
        assert!(!note.tick(100.0));
        assert_eq!(note.progress(0.5), 0.0);
    }

    #[test]
    fn progress_drains_linearly() {
        let mut note = Notification::with_duration(Duration::from_secs(4));
        note.show("x", 0.0);
        approx::assert_relative_eq!(note.progress(1.0), 0.75);
        approx::assert_relative_eq!(note.progress(5.0), 0.0);
    }
}
