// ABOUTME: Status bar widget — renders model, user, entry count, sync time, and reply indicator.
// ABOUTME: Displayed at the bottom of the TUI as a single-line summary.

use std::time::Instant;

use chrono::{DateTime, Local};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

/// Inputs for [`status_line`].
pub struct StatusBarParams<'a> {
    pub model: &'a str,
    pub username: Option<&'a str>,
    pub icon: Option<&'a str>,
    pub entry_count: usize,
    pub last_sync: Option<DateTime<Local>>,
    pub session_start: Instant,
    pub awaiting_reply: bool,
}

/// Render the status bar line.
pub fn status_line(params: &StatusBarParams<'_>) -> Line<'static> {
    let dim = Style::default().fg(Color::DarkGray);
    let white = Style::default().fg(Color::White);

    let who = match (params.icon, params.username) {
        (Some(icon), Some(name)) => format!("{} {} ", icon, name),
        _ => "not signed in ".to_string(),
    };

    let mut spans = vec![
        Span::styled(format!(" {} ", params.model), Style::default().fg(Color::Cyan)),
        Span::styled("| ", dim),
        Span::styled(who, white),
        Span::styled("| ", dim),
        Span::styled(format!("{} messages ", params.entry_count), white),
        Span::styled("| ", dim),
        Span::styled(
            match params.last_sync {
                Some(t) => format!("synced {} ", t.format("%H:%M:%S")),
                None => "not synced ".to_string(),
            },
            white,
        ),
        Span::styled("| ", dim),
        Span::styled(
            format!("{} ", format_elapsed(params.session_start.elapsed().as_secs())),
            dim,
        ),
    ];

    if params.awaiting_reply {
        spans.push(Span::styled("| ", dim));
        spans.push(Span::styled(
            "assistant typing... ",
            Style::default().fg(Color::Yellow),
        ));
    }

    Line::from(spans)
}

/// Format a session duration: `4m 05s`, or `1h 02m` past an hour.
pub fn format_elapsed(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
