//! Bottom status bar.

use eframe::egui::{self, RichText};

use crate::state::AppState;
use crate::theme::status;

/// Renders proxy status, row count, and any background status message.
pub fn render(ui: &mut egui::Ui, state: &AppState) {
    ui.horizontal(|ui| {
        ui.colored_label(state.proxy_status.color(), "\u{25cf}");
        ui.label(state.status_text());

        if let Some(message) = &state.status_message {
            ui.separator();
            ui.colored_label(status::WARNING, message);
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(
                RichText::new(format!("v{}", env!("CARGO_PKG_VERSION")))
                    .size(10.0)
                    .weak(),
            );
        });
    });
}
