//! UI views for the capture viewer.

pub mod controls;
pub mod status_bar;
pub mod table;
