// ABOUTME: TUI state types — the room view, local notices, input buffer, and credential gate.
// ABOUTME: Drives the TUI rendering and bridges the sync loop and dispatcher to the display.

use std::time::Instant;

use chrono::{DateTime, Local};

use crate::room::ChatEntry;

/// What the input box is currently collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    NeedsApiKey,
    NeedsUsername,
    Open,
}

/// Severity of a local notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// A line shown only in this session, never written to the shared history.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    /// Number of history entries that precede this notice on screen.
    pub after: usize,
}

/// Full TUI application state.
pub struct TuiState {
    pub gate: Gate,
    pub entries: Vec<ChatEntry>,
    pub notices: Vec<Notice>,
    /// Streamed assistant text not yet committed to history.
    pub reply_preview: Option<String>,
    pub awaiting_reply: bool,
    pub input: String,
    pub cursor_pos: usize,
    pub scroll_offset: u16,
    pub model: String,
    pub room_label: String,
    pub trigger: String,
    pub assistant_name: String,
    pub assistant_icon: String,
    pub username: Option<String>,
    pub icon: Option<&'static str>,
    pub last_sync: Option<DateTime<Local>>,
    pub session_start: Instant,
}

impl TuiState {
    /// Create a gated state for the given model, room label and trigger token.
    pub fn new(model: String, room_label: String, trigger: String) -> Self {
        Self {
            gate: Gate::NeedsApiKey,
            entries: Vec::new(),
            notices: Vec::new(),
            reply_preview: None,
            awaiting_reply: false,
            input: String::new(),
            cursor_pos: 0,
            scroll_offset: 0,
            model,
            room_label,
            trigger,
            assistant_name: "Assistant".to_string(),
            assistant_icon: "\u{2728}".to_string(),
            username: None,
            icon: None,
            last_sync: None,
            session_start: Instant::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.gate == Gate::Open
    }

    /// Unlock chat for a connected user.
    pub fn open(&mut self, username: &str, icon: &'static str, entries: Vec<ChatEntry>) {
        self.gate = Gate::Open;
        self.username = Some(username.to_string());
        self.icon = Some(icon);
        self.set_entries(entries);
    }

    /// Replace the room view with a fresh snapshot and jump to the bottom.
    pub fn set_entries(&mut self, entries: Vec<ChatEntry>) {
        self.entries = entries;
        self.last_sync = Some(Local::now());
        self.scroll_offset = 0;
    }

    pub fn push_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notices.push(Notice {
            kind,
            text: text.into(),
            after: self.entries.len(),
        });
        self.scroll_offset = 0;
    }

    pub fn push_error(&mut self, text: impl Into<String>) {
        self.push_notice(NoticeKind::Error, text);
    }

    /// Append a streamed fragment to the in-progress reply.
    pub fn append_reply_fragment(&mut self, text: &str) {
        self.reply_preview
            .get_or_insert_with(String::new)
            .push_str(text);
        self.scroll_offset = 0;
    }

    /// Drop the in-progress reply; history now holds the final text, or nothing.
    pub fn finish_reply(&mut self) {
        self.reply_preview = None;
        self.awaiting_reply = false;
    }

    /// Submit the current input buffer. Returns the trimmed text if non-empty.
    pub fn submit_input(&mut self) -> Option<String> {
        let trimmed = self.input.trim().to_string();
        if trimmed.is_empty() {
            return None;
        }
        self.input.clear();
        self.cursor_pos = 0;
        Some(trimmed)
    }

    /// Clamp the cursor position to the valid character range of the input buffer.
    pub fn clamp_cursor(&mut self) {
        self.cursor_pos = self.cursor_pos.min(self.input_char_len());
    }

    /// Return the current cursor byte index in the UTF-8 input buffer.
    pub fn cursor_byte_index(&self) -> usize {
        char_index_to_byte_index(&self.input, self.cursor_pos)
    }

    /// Return the total number of characters in the input buffer.
    pub fn input_char_len(&self) -> usize {
        self.input.chars().count()
    }

    /// Lines of the input buffer; always at least one.
    pub fn input_lines(&self) -> Vec<&str> {
        self.input.split('\n').collect()
    }

    pub fn input_line_count(&self) -> usize {
        self.input_lines().len()
    }

    /// Zero-based line index of the cursor within the input.
    pub fn cursor_line(&self) -> usize {
        self.input
            .chars()
            .take(self.cursor_pos)
            .filter(|c| *c == '\n')
            .count()
    }

    /// Zero-based character column of the cursor within its line.
    pub fn cursor_column(&self) -> usize {
        self.input
            .chars()
            .take(self.cursor_pos)
            .collect::<Vec<_>>()
            .iter()
            .rev()
            .take_while(|c| **c != '\n')
            .count()
    }

    /// Insert a character at the cursor and advance by one character.
    pub fn insert_char_at_cursor(&mut self, c: char) {
        self.clamp_cursor();
        let byte_index = self.cursor_byte_index();
        self.input.insert(byte_index, c);
        self.cursor_pos += 1;
    }

    /// Insert a pasted string at the cursor.
    pub fn insert_str_at_cursor(&mut self, s: &str) {
        for c in s.chars() {
            self.insert_char_at_cursor(c);
        }
    }

    /// Delete the character before the cursor (backspace behavior).
    pub fn backspace_char(&mut self) {
        self.clamp_cursor();
        if self.cursor_pos == 0 {
            return;
        }

        let end = self.cursor_byte_index();
        let start = char_index_to_byte_index(&self.input, self.cursor_pos - 1);
        self.input.replace_range(start..end, "");
        self.cursor_pos -= 1;
    }

    /// Delete the character at the cursor (delete behavior).
    pub fn delete_char_at_cursor(&mut self) {
        self.clamp_cursor();
        if self.cursor_pos >= self.input_char_len() {
            return;
        }

        let start = self.cursor_byte_index();
        let end = char_index_to_byte_index(&self.input, self.cursor_pos + 1);
        self.input.replace_range(start..end, "");
    }

    /// Move cursor one character to the left.
    pub fn move_cursor_left(&mut self) {
        self.clamp_cursor();
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    /// Move cursor one character to the right.
    pub fn move_cursor_right(&mut self) {
        self.clamp_cursor();
        if self.cursor_pos < self.input_char_len() {
            self.cursor_pos += 1;
        }
    }

    /// Move cursor to start of input.
    pub fn move_cursor_home(&mut self) {
        self.cursor_pos = 0;
    }

    /// Move cursor to end of input.
    pub fn move_cursor_end(&mut self) {
        self.cursor_pos = self.input_char_len();
    }
}

fn char_index_to_byte_index(s: &str, char_index: usize) -> usize {
    if char_index == 0 {
        return 0;
    }

    match s.char_indices().nth(char_index) {
        Some((idx, _)) => idx,
        None => s.len(),
    }
}
