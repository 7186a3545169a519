// ABOUTME: Room module — the chat entry data model and per-user icon assignment.
// ABOUTME: Everything here is plain data shared by the store, dispatcher, and TUI.

pub mod entry;
pub mod icon;

pub use entry::{ChatEntry, HistoryLog, Role};
pub use icon::icon_for;
