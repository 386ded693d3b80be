//! Captured data table.
//!
//! Only the visible rows are laid out, so large captures stay responsive.

use eframe::egui::{self, RichText, ScrollArea};

use apitap_core::Table;

use crate::state::AppState;
use crate::theme;

const CELL_WIDTH: f32 = 180.0;
const ROW_HEIGHT: f32 = 20.0;

/// Renders the table of captured rows.
pub fn render(ui: &mut egui::Ui, state: &AppState) {
    let engine = state.engine.lock();
    let table = engine.table();

    if table.is_empty() {
        ui.centered_and_justified(|ui| {
            ui.label(
                RichText::new("No data yet. Start the proxy and browse, or load a saved file.")
                    .weak(),
            );
        });
        return;
    }

    ScrollArea::horizontal()
        .id_source("table_h")
        .auto_shrink([false, false])
        .show(ui, |ui| {
            ui.vertical(|ui| {
                render_header(ui, table);

                ScrollArea::vertical()
                    .id_source("table_v")
                    .auto_shrink([false, false])
                    .show_rows(ui, ROW_HEIGHT, table.len(), |ui, row_range| {
                        for index in row_range {
                            render_row(ui, table, index);
                        }
                    });
            });
        });
}

fn render_header(ui: &mut egui::Ui, table: &Table) {
    egui::Frame::none()
        .fill(theme::table::HEADER_BG)
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.add_sized([48.0, ROW_HEIGHT], egui::Label::new(header_text("#")));
                for column in table.columns() {
                    ui.add_sized(
                        [CELL_WIDTH, ROW_HEIGHT],
                        egui::Label::new(header_text(column)).truncate(),
                    );
                }
            });
        });
}

fn header_text(text: &str) -> RichText {
    RichText::new(text).strong().color(theme::table::HEADER_TEXT)
}

fn render_row(ui: &mut egui::Ui, table: &Table, index: usize) {
    let fill = if index % 2 == 1 {
        theme::table::STRIPE
    } else {
        egui::Color32::TRANSPARENT
    };

    egui::Frame::none().fill(fill).show(ui, |ui| {
        ui.horizontal(|ui| {
            ui.add_sized(
                [48.0, ROW_HEIGHT],
                egui::Label::new(RichText::new((index + 1).to_string()).weak()),
            );
            for text in table.display_row(index) {
                render_cell(ui, text);
            }
        });
    });
}

fn render_cell(ui: &mut egui::Ui, text: String) {
    let response = ui.add_sized(
        [CELL_WIDTH, ROW_HEIGHT],
        egui::Label::new(text.as_str())
            .truncate()
            .sense(egui::Sense::click()),
    );
    let response = if text.is_empty() {
        response
    } else {
        response.on_hover_text(text.as_str())
    };

    response.context_menu(|ui| {
        if ui.button("Copy").clicked() {
            ui.output_mut(|output| output.copied_text = text.clone());
            ui.close_menu();
        }
    });
}
