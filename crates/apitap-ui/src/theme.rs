//! apitap UI colors.

use eframe::egui::Color32;

/// Semantic status colors.
pub mod status {
    use super::Color32;

    /// Running / success.
    pub const SUCCESS: Color32 = Color32::from_rgb(0x16, 0xa3, 0x4a); // #16a34a

    /// Warnings and empty results.
    pub const WARNING: Color32 = Color32::from_rgb(0xd9, 0x77, 0x06); // #d97706

    /// Errors and failed proxy.
    pub const ERROR: Color32 = Color32::from_rgb(0xdc, 0x26, 0x26); // #dc2626

    /// Stopped / idle.
    pub const IDLE: Color32 = Color32::from_rgb(0x6b, 0x72, 0x80); // #6b7280
}

/// Table colors.
pub mod table {
    use super::Color32;

    /// Header background.
    pub const HEADER_BG: Color32 = Color32::from_rgb(0x1e, 0x29, 0x3b); // #1e293b

    /// Header text.
    pub const HEADER_TEXT: Color32 = Color32::from_rgb(0xf1, 0xf5, 0xf9); // #f1f5f9

    /// Stripe for odd rows.
    pub const STRIPE: Color32 = Color32::from_rgba_premultiplied(0x80, 0x80, 0x80, 0x14);
}
