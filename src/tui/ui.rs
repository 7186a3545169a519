// ABOUTME: Main TUI rendering function — assembles header, chat, input, and status bar.
// ABOUTME: Splits the terminal frame into vertical layout chunks and delegates to widgets.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use unicode_width::UnicodeWidthStr;

use crate::tui::state::{Gate, TuiState};
use crate::tui::widgets::chat::render_chat_lines;
use crate::tui::widgets::status::{StatusBarParams, status_line};

/// Masking glyph for the API key while it is typed.
const MASK: char = '\u{2022}';

/// Lines shown in the chat area while the gate is closed.
fn gate_lines(gate: Gate) -> Vec<Line<'static>> {
    let (icon, text) = match gate {
        Gate::NeedsApiKey => ("\u{1f5dd}\u{fe0f}", "Please add your API key to continue."),
        Gate::NeedsUsername => ("\u{1f5e3}\u{fe0f}", "Please enter a username to continue."),
        Gate::Open => return Vec::new(),
    };
    vec![Line::from(Span::styled(
        format!("{} {}", icon, text),
        Style::default().fg(Color::Yellow),
    ))]
}

/// Render the full TUI screen layout to the given frame.
pub fn render(frame: &mut Frame, state: &mut TuiState) {
    let area = frame.area();

    // Maximum height the input area can grow to (in terminal rows).
    const MAX_INPUT_HEIGHT: u16 = 8;

    // +2 accounts for top and bottom borders
    let input_height = (state.input_line_count() as u16 + 2).clamp(3, MAX_INPUT_HEIGHT);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),            // Header
            Constraint::Min(3),               // Chat area
            Constraint::Length(input_height), // Input area
            Constraint::Length(1),            // Status bar
        ])
        .split(area);

    // Header
    let header = Line::from(vec![
        Span::styled(
            " roomclaw",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", state.room_label),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(header), chunks[0]);

    // Chat area
    let chat_lines = if state.is_open() {
        let preview = state.reply_preview.as_deref().map(|text| {
            (
                state.assistant_icon.as_str(),
                state.assistant_name.as_str(),
                text,
            )
        });
        render_chat_lines(&state.entries, &state.notices, preview)
    } else {
        let mut lines = gate_lines(state.gate);
        lines.extend(render_chat_lines(&[], &state.notices, None));
        lines
    };

    let chat_chunk = chunks[1];
    let visible_height = chat_chunk.height;

    // Use ratatui's own line_count() so the scroll math matches its wrapping.
    let chat_paragraph = Paragraph::new(chat_lines).wrap(Wrap { trim: false });
    let total_lines = chat_paragraph.line_count(chat_chunk.width) as u16;
    let max_scroll = total_lines.saturating_sub(visible_height);

    // Cap scroll_offset so it can't go past the top of the content.
    if state.scroll_offset > max_scroll {
        state.scroll_offset = max_scroll;
    }

    // scroll_offset is lines scrolled up from the bottom (0 = at bottom)
    let scroll = max_scroll.saturating_sub(state.scroll_offset);
    frame.render_widget(chat_paragraph.scroll((scroll, 0)), chat_chunk);

    // Input area
    let input_chunk = chunks[2];
    let title = match state.gate {
        Gate::NeedsApiKey => " API key ".to_string(),
        Gate::NeedsUsername => " Enter your username ".to_string(),
        Gate::Open => format!(" Message (start with '{}' to ask the assistant) ", state.trigger),
    };
    let input_block = Block::default()
        .borders(Borders::TOP | Borders::BOTTOM)
        .title(Span::styled(title, Style::default().fg(Color::DarkGray)));

    let input_text = if state.gate == Gate::NeedsApiKey {
        MASK.to_string().repeat(state.input_char_len())
    } else {
        state.input.clone()
    };
    let input = Paragraph::new(input_text).block(input_block);
    frame.render_widget(input, input_chunk);

    if input_chunk.width > 0 && input_chunk.height > 1 {
        state.clamp_cursor();

        let cursor_line = state.cursor_line();
        let cursor_col = state.cursor_column();

        // Visual width of the text before the cursor on its line.
        let visual_col = if state.gate == Gate::NeedsApiKey {
            cursor_col
        } else {
            let lines = state.input_lines();
            let line_text = lines.get(cursor_line).copied().unwrap_or("");
            let prefix: String = line_text.chars().take(cursor_col).collect();
            UnicodeWidthStr::width(prefix.as_str())
        };

        let max_visual_col = input_chunk.width.saturating_sub(1) as usize;
        let cursor_x = input_chunk
            .x
            .saturating_add(visual_col.min(max_visual_col) as u16);
        // +1 for the top border, then offset by the cursor's line index.
        let cursor_y = input_chunk.y.saturating_add(1 + cursor_line as u16);
        frame.set_cursor_position(Position::new(cursor_x, cursor_y));
    }

    // Status bar
    let status = status_line(&StatusBarParams {
        model: &state.model,
        username: state.username.as_deref(),
        icon: state.icon,
        entry_count: state.entries.len(),
        last_sync: state.last_sync,
        session_start: state.session_start,
        awaiting_reply: state.awaiting_reply,
    });
    frame.render_widget(Paragraph::new(status), chunks[3]);
}
