// ABOUTME: Library root for roomclaw — re-exports all modules for integration testing.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod app;
pub mod config;
pub mod dispatch;
pub mod llm;
pub mod logging;
pub mod room;
pub mod session;
pub mod store;
pub mod tui;
