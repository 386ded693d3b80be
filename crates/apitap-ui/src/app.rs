//! Main application struct and eframe integration.

use std::time::Instant;

use eframe::egui;

use crate::state::{AppState, ViewerOptions};
use crate::theme::status;
use crate::views::{controls, status_bar, table};

/// The capture viewer application.
pub struct ViewerApp {
    state: AppState,
}

impl ViewerApp {
    /// Creates the viewer.
    pub fn new(options: ViewerOptions) -> Self {
        Self {
            state: AppState::new(options),
        }
    }

    /// Returns the window options for eframe.
    pub fn window_options() -> eframe::NativeOptions {
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([1100.0, 700.0])
                .with_min_inner_size([700.0, 400.0])
                .with_title("apitap"),
            ..Default::default()
        }
    }

    /// Polls the capture file when due and schedules the next frame.
    fn tick(&mut self, ctx: &egui::Context) {
        self.state.check_proxy();

        if self.state.poll_due(Instant::now()) {
            if let Some(outcome) = self.state.poll() {
                if outcome.has_new_rows() {
                    tracing::debug!("{} new rows", outcome.new_rows);
                }
            }
        }

        ctx.request_repaint_after(self.state.poll_interval());
    }

    /// Renders messages (error/success toasts).
    fn render_messages(&mut self, ctx: &egui::Context) {
        let mut clear_error = false;
        if let Some(error) = self.state.error_message.clone() {
            egui::TopBottomPanel::bottom("error_panel").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(status::ERROR, "\u{26a0}");
                    ui.label(&error);
                    if ui.button("\u{2715}").clicked() {
                        clear_error = true;
                    }
                });
            });
        }
        if clear_error {
            self.state.error_message = None;
        }

        let mut clear_success = false;
        if let Some(success) = self.state.success_message.clone() {
            egui::TopBottomPanel::bottom("success_panel").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(status::SUCCESS, "\u{2713}");
                    ui.label(&success);
                    if ui.button("\u{2715}").clicked() {
                        clear_success = true;
                    }
                });
            });
        }
        if clear_success {
            self.state.success_message = None;
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.tick(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.add_space(6.0);
            controls::render(ui, &mut self.state);
            ui.add_space(6.0);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            status_bar::render(ui, &self.state);
        });

        self.render_messages(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            table::render(ui, &self.state);
        });

        controls::render_confirm_clear(ctx, &mut self.state);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.state.shutdown();
    }
}
