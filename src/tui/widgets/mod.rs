// ABOUTME: TUI widget sub-modules for the chat scrollback and status bar.
// ABOUTME: Each widget is a pure rendering function over TuiState data.

pub mod chat;
pub mod status;
