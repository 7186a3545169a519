// ABOUTME: E2E tests for TUI rendering using ratatui's TestBackend.
// ABOUTME: Verifies the credential gate, room entries, streamed preview, and status bar render.

use ratatui::Terminal;
use ratatui::backend::TestBackend;

use roomclaw::room::ChatEntry;
use roomclaw::tui::state::{Gate, TuiState};
use roomclaw::tui::ui;

/// Extract a single row of text from the terminal buffer as a String.
fn row_text(terminal: &Terminal<TestBackend>, y: u16) -> String {
    let buf = terminal.backend().buffer();
    let width = buf.area.width;
    (0..width)
        .map(|x| {
            buf.cell((x, y))
                .map(|c| c.symbol().chars().next().unwrap_or(' '))
                .unwrap_or(' ')
        })
        .collect()
}

/// Extract all text from the terminal buffer as a single string (rows joined by newlines).
fn all_text(terminal: &Terminal<TestBackend>) -> String {
    let buf = terminal.backend().buffer();
    let height = buf.area.height;
    (0..height)
        .map(|y| row_text(terminal, y))
        .collect::<Vec<_>>()
        .join("\n")
}

fn state() -> TuiState {
    TuiState::new(
        "test-model".to_string(),
        "/tmp/chat_history.json".to_string(),
        "nurt".to_string(),
    )
}

fn draw(terminal: &mut Terminal<TestBackend>, state: &mut TuiState) {
    terminal.draw(|frame| ui::render(frame, state)).unwrap();
}

/// A fresh state renders the header with the app name and room label, and
/// the chat area asks for an API key before anything else.
#[test]
fn renders_api_key_gate() {
    let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
    let mut state = state();

    draw(&mut terminal, &mut state);

    let header = row_text(&terminal, 0);
    assert!(header.contains("roomclaw"), "header: {:?}", header);
    assert!(header.contains("/tmp/chat_history.json"), "header: {:?}", header);

    let text = all_text(&terminal);
    assert!(
        text.contains("Please add your API key to continue."),
        "gate prompt missing, got:\n{}",
        text,
    );
}

/// The API key is masked while typed.
#[test]
fn api_key_input_is_masked() {
    let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
    let mut state = state();
    state.insert_str_at_cursor("sk-secret-value");

    draw(&mut terminal, &mut state);

    let text = all_text(&terminal);
    assert!(!text.contains("sk-secret-value"), "key leaked:\n{}", text);
    assert!(text.contains("•••••"), "mask missing:\n{}", text);
}

/// Once the key is in, the gate asks for a username and shows input as typed.
#[test]
fn renders_username_gate() {
    let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
    let mut state = state();
    state.gate = Gate::NeedsUsername;
    state.insert_str_at_cursor("alice");

    draw(&mut terminal, &mut state);

    let text = all_text(&terminal);
    assert!(text.contains("Please enter a username to continue."));
    assert!(text.contains("alice"));
}

/// An open room renders every entry with its sender, and never the gate prompts.
#[test]
fn renders_room_entries() {
    let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
    let mut state = state();
    state.open(
        "alice",
        "🐱",
        vec![
            ChatEntry::user("bob", "🐶", "nurt what is rust?"),
            ChatEntry::assistant("Assistant", "✨", "A systems language."),
        ],
    );

    draw(&mut terminal, &mut state);

    let text = all_text(&terminal);
    assert!(text.contains("bob: nurt what is rust?"), "got:\n{}", text);
    assert!(text.contains("Assistant: A systems language."), "got:\n{}", text);
    assert!(!text.contains("Please add your API key"));
    assert!(text.contains("start with 'nurt'"), "input title missing:\n{}", text);
}

/// A streamed reply in progress is shown under the assistant's name.
#[test]
fn renders_streaming_preview() {
    let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
    let mut state = state();
    state.open("alice", "🐱", vec![ChatEntry::user("alice", "🐱", "nurt hi")]);
    state.awaiting_reply = true;
    state.append_reply_fragment("Hello th");

    draw(&mut terminal, &mut state);

    let text = all_text(&terminal);
    assert!(text.contains("Assistant: Hello th"), "got:\n{}", text);
}

/// The status bar shows the model, the signed-in user, and the entry count.
#[test]
fn renders_status_bar() {
    let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
    let mut state = state();
    state.open(
        "alice",
        "🐱",
        vec![
            ChatEntry::user("bob", "🐶", "one"),
            ChatEntry::user("carol", "🐰", "two"),
        ],
    );
    state.awaiting_reply = true;

    draw(&mut terminal, &mut state);

    let status = row_text(&terminal, 23);
    assert!(status.contains("test-model"), "status: {:?}", status);
    assert!(status.contains("alice"), "status: {:?}", status);
    assert!(status.contains("2 messages"), "status: {:?}", status);
    assert!(status.contains("assistant typing"), "status: {:?}", status);
}

/// Wrapped chat lines should contribute to scroll bounds so long entries
/// don't appear clipped by the input area.
#[test]
fn scroll_clamp_accounts_for_wrapped_chat_height() {
    let mut terminal = Terminal::new(TestBackend::new(24, 10)).unwrap();
    let mut state = state();
    state.open(
        "alice",
        "🐱",
        vec![ChatEntry::assistant(
            "Assistant",
            "✨",
            "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi omicron pi rho sigma tau upsilon phi chi psi omega",
        )],
    );
    state.scroll_offset = 100;

    draw(&mut terminal, &mut state);

    assert!(
        state.scroll_offset > 0 && state.scroll_offset < 100,
        "scroll offset should clamp to the wrapped content height, got {}",
        state.scroll_offset,
    );
}

/// New entries from a sync keep the viewport pinned to the bottom.
#[test]
fn new_entries_stay_pinned_to_bottom() {
    let mut terminal = Terminal::new(TestBackend::new(30, 10)).unwrap();
    let mut state = state();
    state.open("alice", "🐱", vec![ChatEntry::user("bob", "🐶", "line1")]);
    draw(&mut terminal, &mut state);

    let entries: Vec<ChatEntry> = (1..=8)
        .map(|i| ChatEntry::user("bob", "🐶", &format!("line{}", i)))
        .collect();
    state.set_entries(entries);
    draw(&mut terminal, &mut state);

    let text = all_text(&terminal);
    assert!(text.contains("line8"), "newest entry missing:\n{}", text);
    assert!(!text.contains("line1 "), "oldest entry still visible:\n{}", text);
}

/// Cursor should be clamped to the input viewport when the input text exceeds available width.
#[test]
fn cursor_is_clamped_inside_input_viewport_for_long_input() {
    let mut terminal = Terminal::new(TestBackend::new(12, 8)).unwrap();
    let mut state = state();
    state.gate = Gate::Open;
    state.input = "abcdefghijklmnopqrstuvwxyz".to_string();
    state.cursor_pos = state.input.chars().count();

    draw(&mut terminal, &mut state);

    let cursor = terminal.get_cursor_position().unwrap();
    assert!(
        cursor.x < 12,
        "cursor x should stay within terminal width, got {:?}",
        cursor,
    );
}
