// ABOUTME: App orchestrator — wires together the history store, session, sync loop, dispatcher, and TUI.
// ABOUTME: Gates chat on credentials, then runs one event loop over keys, sync events, and room events.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use crossterm::event::{
    DisableBracketedPaste, EnableBracketedPaste, Event, EventStream, KeyEventKind,
};
use crossterm::execute;
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::dispatch::{DispatchOutcome, DispatchSettings, Dispatcher};
use crate::llm::{ApiKey, CompletionClient, OpenAiClient};
use crate::room::{ChatEntry, HistoryLog};
use crate::session::{Credentials, Session, SyncEvent, SyncHandle, append_after, spawn_sync_loop};
use crate::store::HistoryStore;
use crate::tui::input::{self, InputResult};
use crate::tui::state::{Gate, NoticeKind, TuiState};
use crate::tui::ui;

/// Results of background room work, delivered to the UI loop in arrival order.
#[derive(Debug)]
pub enum RoomEvent {
    /// A local post landed, with the log as it stood right after, or failed.
    Posted(Result<(ChatEntry, HistoryLog), String>),
    /// A streamed fragment of the assistant reply in progress.
    ReplyFragment(String),
    ReplyFinished(Result<DispatchOutcome, String>),
}

/// Everything that exists only once the user is connected.
struct Room {
    session: Session,
    dispatcher: Arc<Dispatcher>,
    sync: SyncHandle,
    sync_rx: mpsc::Receiver<SyncEvent>,
    /// Local posts not yet written, oldest first. One write runs at a time.
    outbox: VecDeque<ChatEntry>,
    posting: bool,
    /// Triggered posts waiting for the assistant, oldest first.
    queued: VecDeque<ChatEntry>,
    in_flight: bool,
    last_sync_error: Option<String>,
}

impl Room {
    fn join(
        session: Session,
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn HistoryStore>,
        config: &Config,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            client,
            store.clone(),
            DispatchSettings::from_config(config),
        ));

        let (sync_tx, sync_rx) = mpsc::channel(16);
        let sync = spawn_sync_loop(
            store,
            session.view().clone(),
            config.room.poll_interval(),
            sync_tx,
        );

        Self {
            session,
            dispatcher,
            sync,
            sync_rx,
            outbox: VecDeque::new(),
            posting: false,
            queued: VecDeque::new(),
            in_flight: false,
            last_sync_error: None,
        }
    }

    /// Queue a message typed by the local user.
    fn submit(&mut self, state: &mut TuiState, text: &str, events: &mpsc::Sender<RoomEvent>) {
        match self.session.compose(text) {
            Ok(entry) => {
                self.outbox.push_back(entry);
                self.start_next_post(events);
            }
            Err(e) => state.push_error(e.to_string()),
        }
    }

    /// Write the oldest outbox entry in the background, unless a write is running.
    fn start_next_post(&mut self, events: &mpsc::Sender<RoomEvent>) {
        if self.posting {
            return;
        }
        let Some(entry) = self.outbox.pop_front() else {
            return;
        };
        self.posting = true;

        let store = self.session.store().clone();
        let view = self.session.view().clone();
        let events = events.clone();
        tokio::spawn(async move {
            let result = append_after(&store, view, entry.clone())
                .await
                .map(|log| (entry, log))
                .map_err(|e| e.to_string());
            let _ = events.send(RoomEvent::Posted(result)).await;
        });
    }

    fn handle(
        &mut self,
        state: &mut TuiState,
        event: RoomEvent,
        events: &mpsc::Sender<RoomEvent>,
    ) {
        match event {
            RoomEvent::Posted(result) => self.on_posted(state, result, events),
            RoomEvent::ReplyFragment(text) => state.append_reply_fragment(&text),
            RoomEvent::ReplyFinished(result) => self.on_reply_finished(state, result, events),
        }
    }

    fn on_posted(
        &mut self,
        state: &mut TuiState,
        result: Result<(ChatEntry, HistoryLog), String>,
        events: &mpsc::Sender<RoomEvent>,
    ) {
        self.posting = false;
        match result {
            Ok((entry, log)) => {
                self.session.apply(log);
                self.sync.nudge();
                state.set_entries(self.session.view().entries().to_vec());
                if self.dispatcher.should_respond(&entry) {
                    self.queued.push_back(entry);
                    self.start_next_dispatch(state, events);
                }
            }
            Err(message) => {
                tracing::error!(error = %message, "failed to post message");
                state.push_error(message);
            }
        }
        self.start_next_post(events);
    }

    fn on_sync(&mut self, state: &mut TuiState, event: SyncEvent) {
        match event {
            SyncEvent::HistoryChanged(log) => {
                self.last_sync_error = None;
                if self.session.apply(log) {
                    state.set_entries(self.session.view().entries().to_vec());
                } else {
                    state.last_sync = Some(chrono::Local::now());
                }
            }
            SyncEvent::Failed(message) => {
                // One notice per distinct failure, not one per poll.
                if self.last_sync_error.as_deref() != Some(message.as_str()) {
                    state.push_error(format!("History unavailable: {}", message));
                    self.last_sync_error = Some(message);
                }
            }
        }
    }

    fn on_reply_finished(
        &mut self,
        state: &mut TuiState,
        result: Result<DispatchOutcome, String>,
        events: &mpsc::Sender<RoomEvent>,
    ) {
        self.in_flight = false;
        state.finish_reply();
        match result {
            // The sync loop delivers the stored reply.
            Ok(DispatchOutcome::Replied(_)) => self.sync.nudge(),
            Ok(DispatchOutcome::Skipped) => {}
            Err(message) => state.push_error(message),
        }
        self.start_next_dispatch(state, events);
    }

    /// Hand the oldest queued post to the dispatcher, unless a reply is running.
    fn start_next_dispatch(&mut self, state: &mut TuiState, events: &mpsc::Sender<RoomEvent>) {
        if self.in_flight {
            return;
        }
        let Some(entry) = self.queued.pop_front() else {
            return;
        };
        self.in_flight = true;
        state.awaiting_reply = true;

        let dispatcher = self.dispatcher.clone();
        let events = events.clone();
        tokio::spawn(async move {
            let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);
            let fragment_tx = events.clone();
            let forward = tokio::spawn(async move {
                while let Some(text) = delta_rx.recv().await {
                    if fragment_tx.send(RoomEvent::ReplyFragment(text)).await.is_err() {
                        break;
                    }
                }
            });

            let result = dispatcher.dispatch(&entry, Some(&delta_tx)).await;
            drop(delta_tx);
            // Deliver every fragment before the completion notice.
            let _ = forward.await;
            let _ = events
                .send(RoomEvent::ReplyFinished(result.map_err(|e| e.to_string())))
                .await;
        });
    }
}

/// Top-level application that orchestrates all subsystems.
pub struct App {
    config: Config,
    store: Arc<dyn HistoryStore>,
    room_label: String,
    credentials: Credentials,
    room: Option<Room>,
}

impl App {
    /// Create a new app over an already-opened store.
    pub fn new(
        config: Config,
        store: Arc<dyn HistoryStore>,
        room_label: String,
        credentials: Credentials,
    ) -> Self {
        Self {
            config,
            store,
            room_label,
            credentials,
            room: None,
        }
    }

    /// Run the application: drive the TUI until the user quits, then tear down.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut state = TuiState::new(
            self.config.llm.model.clone(),
            self.room_label.clone(),
            self.config.room.trigger.clone(),
        );
        state.assistant_name = self.config.room.assistant_name.clone();
        state.assistant_icon = self.config.room.assistant_icon.clone();

        let mut terminal = ratatui::init();
        if let Err(e) = execute!(io::stdout(), EnableBracketedPaste) {
            tracing::warn!(error = %e, "bracketed paste unavailable");
        }
        let result = self.event_loop(&mut terminal, &mut state).await;
        let _ = execute!(io::stdout(), DisableBracketedPaste);
        ratatui::restore();

        if let Some(room) = self.room.take() {
            room.sync.shutdown().await;
        }
        tracing::info!("session ended");
        print_exit_screen(&state);
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut DefaultTerminal,
        state: &mut TuiState,
    ) -> anyhow::Result<()> {
        let (room_tx, mut room_rx) = mpsc::channel::<RoomEvent>(64);
        let mut events = EventStream::new();

        self.advance_gate(state).await;

        loop {
            terminal.draw(|frame| ui::render(frame, state))?;

            tokio::select! {
                maybe_event = events.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        match input::handle_key(state, key) {
                            InputResult::Quit => break,
                            InputResult::ApiKey(key) => {
                                self.credentials.api_key = Some(key);
                                self.advance_gate(state).await;
                            }
                            InputResult::Username(name) => {
                                self.credentials.username = Some(name);
                                self.advance_gate(state).await;
                            }
                            InputResult::Send(text) => {
                                if let Some(room) = self.room.as_mut() {
                                    room.submit(state, &text, &room_tx);
                                }
                            }
                            InputResult::None => {}
                        }
                    }
                    Some(Ok(Event::Paste(text))) => state.insert_str_at_cursor(&text),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },
                Some(event) = recv_sync(&mut self.room) => {
                    if let Some(room) = self.room.as_mut() {
                        room.on_sync(state, event);
                    }
                }
                Some(event) = room_rx.recv() => {
                    if let Some(room) = self.room.as_mut() {
                        room.handle(state, event, &room_tx);
                    }
                }
            }
        }

        Ok(())
    }

    /// Move the gate forward with whatever credentials are known, connecting
    /// once both are present.
    async fn advance_gate(&mut self, state: &mut TuiState) {
        if self.room.is_some() {
            return;
        }
        if self
            .credentials
            .api_key
            .as_deref()
            .and_then(ApiKey::new)
            .is_none()
        {
            state.gate = Gate::NeedsApiKey;
            return;
        }
        if self
            .credentials
            .username
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
        {
            state.gate = Gate::NeedsUsername;
            return;
        }

        match self.connect().await {
            Ok(room) => {
                state.open(
                    room.session.username(),
                    room.session.icon(),
                    room.session.view().entries().to_vec(),
                );
                state.push_notice(
                    NoticeKind::Info,
                    format!(
                        "Joined as {} {}. Start a message with '{}' to ask the assistant.",
                        room.session.icon(),
                        room.session.username(),
                        self.config.room.trigger
                    ),
                );
                self.room = Some(room);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to join room");
                state.push_error(format!("Could not join the room: {}", e));
                self.credentials.username = None;
                state.gate = Gate::NeedsUsername;
            }
        }
    }

    async fn connect(&self) -> anyhow::Result<Room> {
        let session = Session::connect(self.credentials.clone(), self.store.clone()).await?;
        let client: Arc<dyn CompletionClient> =
            Arc::new(OpenAiClient::new(&self.config.llm, session.api_key().clone())?);
        Ok(Room::join(session, client, self.store.clone(), &self.config))
    }
}

/// Next sync event, or never while no room is joined.
async fn recv_sync(room: &mut Option<Room>) -> Option<SyncEvent> {
    match room {
        Some(room) => room.sync_rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Print a farewell screen after the TUI exits.
fn print_exit_screen(state: &TuiState) {
    let elapsed =
        crate::tui::widgets::status::format_elapsed(state.session_start.elapsed().as_secs());
    let who = state.username.as_deref().unwrap_or("stranger");

    println!();
    println!("  \u{1f43e} \x1b[1mThanks for chatting, {}!\x1b[0m", who);
    println!(
        "  \u{1f550} Session lasted {} with {} messages in the room.",
        elapsed,
        state.entries.len()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use tokio::sync::Semaphore;

    use super::*;
    use crate::llm::{CompletionError, CompletionRequest};
    use crate::room::Role;
    use crate::store::MemoryHistoryStore;

    /// Streams one scripted reply per call, each held until the test opens the gate.
    struct GatedClient {
        gate: Arc<Semaphore>,
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        calls: AtomicUsize,
    }

    impl GatedClient {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            Arc::new(Self {
                gate: Arc::new(Semaphore::new(0)),
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for GatedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.complete_stream(request)
                .next()
                .await
                .unwrap_or(Err(CompletionError::EmptyResponse))
        }

        fn complete_stream(
            &self,
            _request: &CompletionRequest,
        ) -> BoxStream<'static, Result<String, CompletionError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("completion called more times than scripted");
            let gate = self.gate.clone();
            stream::once(async move {
                let _permit = gate.acquire_owned().await.expect("gate closed");
                reply
            })
            .boxed()
        }
    }

    struct Harness {
        room: Room,
        state: TuiState,
        store: Arc<dyn HistoryStore>,
        tx: mpsc::Sender<RoomEvent>,
        rx: mpsc::Receiver<RoomEvent>,
    }

    impl Harness {
        async fn new(client: Arc<GatedClient>) -> Self {
            let store: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
            let mut config = Config::default();
            config.room.poll_interval_ms = 60_000;
            let credentials = Credentials {
                api_key: Some("sk-test".to_string()),
                username: Some("alice".to_string()),
            };
            let session = Session::connect(credentials, store.clone()).await.unwrap();
            let mut state = TuiState::new("test-model".into(), "room".into(), "nurt".into());
            state.open(session.username(), session.icon(), Vec::new());
            let room = Room::join(session, client, store.clone(), &config);
            let (tx, rx) = mpsc::channel(64);
            Self {
                room,
                state,
                store,
                tx,
                rx,
            }
        }

        fn submit(&mut self, text: &str) {
            self.room.submit(&mut self.state, text, &self.tx);
        }

        /// Handle the next room event. Returns whether it finished a reply.
        async fn pump(&mut self) -> bool {
            let event = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("room event should arrive")
                .expect("room channel open");
            let finished = matches!(event, RoomEvent::ReplyFinished(_));
            self.room.handle(&mut self.state, event, &self.tx);
            finished
        }

        async fn pump_until_finished(&mut self, replies: usize) {
            let mut seen = 0;
            while seen < replies {
                if self.pump().await {
                    seen += 1;
                }
            }
        }

        fn errors(&self) -> Vec<&str> {
            self.state
                .notices
                .iter()
                .filter(|n| n.kind == NoticeKind::Error)
                .map(|n| n.text.as_str())
                .collect()
        }
    }

    #[tokio::test]
    async fn triggered_posts_queue_behind_one_reply() {
        let client = GatedClient::new(vec![Ok("first reply".into()), Ok("second reply".into())]);
        let mut h = Harness::new(client.clone()).await;

        h.submit("nurt one");
        h.submit("nurt two");
        assert!(h.room.posting);
        assert_eq!(h.room.outbox.len(), 1, "second post waits for the first write");

        // Both posts land; the first reply is held at the gate.
        h.pump().await;
        h.pump().await;
        assert_eq!(h.state.entries.len(), 2);
        assert!(h.room.in_flight);
        assert_eq!(h.room.queued.len(), 1);
        tokio::time::timeout(Duration::from_secs(2), async {
            while client.calls() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first dispatch should reach the client");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.calls(), 1, "only one dispatch runs at a time");
        assert!(h.state.awaiting_reply);

        client.gate.add_permits(2);
        h.pump_until_finished(2).await;

        assert_eq!(client.calls(), 2);
        assert!(!h.room.in_flight);
        assert!(h.room.queued.is_empty());
        assert!(!h.state.awaiting_reply);
        assert!(h.errors().is_empty());

        let log = h.store.read().unwrap();
        let replies: Vec<&str> = log
            .iter()
            .filter(|e| e.role == Role::Assistant)
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(replies, vec!["first reply", "second reply"]);
        assert_eq!(log.entries()[0].content, "nurt one");
        assert_eq!(log.entries()[1].content, "nurt two");
    }

    #[tokio::test]
    async fn failed_reply_is_shown_and_history_untouched() {
        let client = GatedClient::new(vec![Err(CompletionError::Auth(
            "Incorrect API key provided".into(),
        ))]);
        client.gate.add_permits(1);
        let mut h = Harness::new(client.clone()).await;

        h.submit("nurt hello");
        h.pump_until_finished(1).await;

        let errors = h.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Incorrect API key"), "{}", errors[0]);
        assert_eq!(h.store.read().unwrap().len(), 1);
        assert!(!h.room.in_flight);
        assert!(h.state.reply_preview.is_none());
    }

    #[tokio::test]
    async fn untriggered_post_never_dispatches() {
        let client = GatedClient::new(vec![]);
        let mut h = Harness::new(client.clone()).await;

        h.submit("just chatting");
        h.pump().await;

        assert_eq!(h.state.entries.len(), 1);
        assert!(!h.room.in_flight);
        assert!(h.room.queued.is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn empty_message_is_refused_locally() {
        let client = GatedClient::new(vec![]);
        let mut h = Harness::new(client).await;

        h.submit("   ");
        assert!(!h.room.posting);
        assert_eq!(h.errors(), vec!["message is empty"]);
    }

    #[tokio::test]
    async fn repeated_sync_failure_shows_one_notice() {
        let client = GatedClient::new(vec![]);
        let mut h = Harness::new(client).await;
        let failed = || SyncEvent::Failed("history at room.json is malformed".into());

        h.room.on_sync(&mut h.state, failed());
        h.room.on_sync(&mut h.state, failed());
        assert_eq!(h.errors().len(), 1);
        assert!(h.errors()[0].starts_with("History unavailable"));

        // A good read clears the failure, so the next one is shown again.
        h.room
            .on_sync(&mut h.state, SyncEvent::HistoryChanged(HistoryLog::new()));
        h.room.on_sync(&mut h.state, failed());
        assert_eq!(h.errors().len(), 2);
    }
}
