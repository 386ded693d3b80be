//! Toolbar: proxy control, domain filter, load, export, clear.

use eframe::egui;

use crate::state::AppState;

/// Renders the toolbar.
pub fn render(ui: &mut egui::Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        ui.heading("apitap");
        ui.add_space(16.0);

        let running = state.proxy_running();
        if ui
            .add_enabled(!running, egui::Button::new("Start proxy"))
            .clicked()
        {
            state.start_proxy();
        }
        if ui
            .add_enabled(running, egui::Button::new("Stop proxy"))
            .clicked()
        {
            state.stop_proxy();
        }

        ui.add_space(8.0);
        ui.label("Domains:");
        ui.add(
            egui::TextEdit::singleline(&mut state.domain_filter)
                .hint_text("all hosts (e.g. api.example.com, cdn.example.com)")
                .desired_width(320.0),
        )
        .on_hover_text("Comma-separated hosts to record. Applied the next time the proxy starts.");
    });

    ui.add_space(4.0);

    ui.horizontal(|ui| {
        ui.label("Load:");
        ui.add(
            egui::TextEdit::singleline(&mut state.load_path)
                .hint_text("path to a saved capture or JSON file")
                .desired_width(260.0),
        );
        if ui.button("Load file").clicked() {
            state.load_file();
        }

        ui.add_space(16.0);

        ui.label("Export:");
        ui.add(egui::TextEdit::singleline(&mut state.export_path).desired_width(260.0));
        ui.checkbox(&mut state.open_after_export, "Open");
        if ui.button("Export").clicked() {
            if let Some(path) = state.export() {
                if state.open_after_export {
                    if let Err(e) = open::that(&path) {
                        tracing::warn!("Failed to open {}: {}", path.display(), e);
                    }
                }
            }
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("Clear").clicked() {
                state.request_clear();
            }
        });
    });
}

/// Renders the clear confirmation window while it is requested.
pub fn render_confirm_clear(ctx: &egui::Context, state: &mut AppState) {
    if !state.confirm_clear {
        return;
    }

    egui::Window::new("Clear captured data?")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label("This empties the table and truncates the capture file.");
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Clear").clicked() {
                    state.clear();
                }
                if ui.button("Cancel").clicked() {
                    state.confirm_clear = false;
                }
            });
        });
}
