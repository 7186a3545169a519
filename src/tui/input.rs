// ABOUTME: Keyboard input handling for the TUI — translates key events into actions.
// ABOUTME: Handles the credential/username gate, normal typing, and scrolling.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::tui::state::{Gate, TuiState};

/// The result of processing a key event.
#[derive(Debug, PartialEq)]
pub enum InputResult {
    /// No action needed.
    None,
    /// User entered an API key at the gate.
    ApiKey(String),
    /// User entered a username at the gate.
    Username(String),
    /// User posted a chat message.
    Send(String),
    /// User wants to quit.
    Quit,
}

/// Process a key event against the current TUI state and return the resulting action.
pub fn handle_key(state: &mut TuiState, key: KeyEvent) -> InputResult {
    // Ctrl+C always quits
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return InputResult::Quit;
    }

    match key.code {
        KeyCode::PageUp => {
            state.scroll_offset = state.scroll_offset.saturating_add(10);
            return InputResult::None;
        }
        KeyCode::PageDown => {
            state.scroll_offset = state.scroll_offset.saturating_sub(10);
            return InputResult::None;
        }
        KeyCode::Up => {
            state.scroll_offset = state.scroll_offset.saturating_add(1);
            return InputResult::None;
        }
        KeyCode::Down => {
            state.scroll_offset = state.scroll_offset.saturating_sub(1);
            return InputResult::None;
        }
        _ => {}
    }

    match key.code {
        // Shift+Enter inserts a newline, but only into chat messages.
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
            if state.gate == Gate::Open {
                state.insert_char_at_cursor('\n');
            }
            InputResult::None
        }
        KeyCode::Enter => match state.submit_input() {
            Some(text) => match state.gate {
                Gate::NeedsApiKey => InputResult::ApiKey(text),
                Gate::NeedsUsername => InputResult::Username(text),
                Gate::Open => InputResult::Send(text),
            },
            None => InputResult::None,
        },
        KeyCode::Char(c) => {
            state.insert_char_at_cursor(c);
            InputResult::None
        }
        KeyCode::Backspace => {
            state.backspace_char();
            InputResult::None
        }
        KeyCode::Delete => {
            state.delete_char_at_cursor();
            InputResult::None
        }
        KeyCode::Left => {
            state.move_cursor_left();
            InputResult::None
        }
        KeyCode::Right => {
            state.move_cursor_right();
            InputResult::None
        }
        KeyCode::Home => {
            state.move_cursor_home();
            InputResult::None
        }
        KeyCode::End => {
            state.move_cursor_end();
            InputResult::None
        }
        KeyCode::Esc => InputResult::Quit,
        _ => InputResult::None,
    }
}
