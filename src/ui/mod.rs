//! TUI module for the instruction reader.

mod app;
pub mod theme;
mod widgets;

pub use app::App;
