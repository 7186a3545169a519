// ABOUTME: Chat widget — renders room entries, local notices, and the streaming reply into Lines.
// ABOUTME: Each entry shows its sender icon and name; users and the assistant get distinct colors.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::room::{ChatEntry, Role};
use crate::tui::state::{Notice, NoticeKind};

/// Cursor glyph appended to a reply that is still streaming.
const STREAM_CURSOR: &str = "\u{258c}";

fn sender_style(role: Role) -> Style {
    let color = match role {
        Role::User => Color::Green,
        Role::Assistant => Color::Cyan,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn push_message(lines: &mut Vec<Line<'static>>, role: Role, icon: &str, sender: &str, content: &str) {
    // First line carries the sender, continuation lines are indented under it.
    for (i, text) in content.split('\n').enumerate() {
        if i == 0 {
            lines.push(Line::from(vec![
                Span::styled(format!("{} {}: ", icon, sender), sender_style(role)),
                Span::raw(text.to_string()),
            ]));
        } else {
            lines.push(Line::from(Span::raw(format!("   {}", text))));
        }
    }
}

fn push_notice(lines: &mut Vec<Line<'static>>, notice: &Notice) {
    let line = match notice.kind {
        NoticeKind::Error => Line::from(Span::styled(
            format!("\u{26a0} Error: {}", notice.text),
            Style::default().fg(Color::Red),
        )),
        NoticeKind::Info => Line::from(Span::styled(
            format!("[system] {}", notice.text),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    };
    lines.push(line);
}

/// Blank line between message groups.
fn separate(lines: &mut Vec<Line<'static>>) {
    if !lines.is_empty() {
        lines.push(Line::from(""));
    }
}

/// Render the room into styled Lines for display.
///
/// Notices are interleaved at the position they were raised; the streaming
/// preview, when present, is always last.
pub fn render_chat_lines(
    entries: &[ChatEntry],
    notices: &[Notice],
    preview: Option<(&str, &str, &str)>,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for notice in notices.iter().filter(|n| n.after == 0) {
        separate(&mut lines);
        push_notice(&mut lines, notice);
    }

    for (idx, entry) in entries.iter().enumerate() {
        separate(&mut lines);
        push_message(
            &mut lines,
            entry.role,
            &entry.icon,
            &entry.sender_name,
            &entry.content,
        );
        for notice in notices.iter().filter(|n| n.after == idx + 1) {
            separate(&mut lines);
            push_notice(&mut lines, notice);
        }
    }

    // Notices anchored past the end (history shrank after a reset) still show.
    for notice in notices.iter().filter(|n| n.after > entries.len()) {
        separate(&mut lines);
        push_notice(&mut lines, notice);
    }

    if let Some((icon, sender, text)) = preview {
        separate(&mut lines);
        push_message(
            &mut lines,
            Role::Assistant,
            icon,
            sender,
            &format!("{}{}", text, STREAM_CURSOR),
        );
    }

    lines
}
