//! TUI application state and main event loop

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio_util::sync::CancellationToken;

use super::log_capture::LogBuffer;
use super::ui;
use crate::auth::popup::PopupState;
use crate::config::Config;
use crate::dashboard::{self, Dashboard, View};

/// Application state
pub struct App {
    pub dashboard: Dashboard,
    /// Most recent log line, shown in the status bar
    pub last_log: Option<String>,
    /// Set once the seller asked for the authorization window
    pub connect_requested: bool,
    /// One-off message from the last key action
    pub notice: Option<String>,
    pub should_exit: bool,
    logs: LogBuffer,
}

enum Input {
    Stepped(bool),
    Terminal(Option<std::io::Result<Event>>),
}

impl App {
    pub fn new(dashboard: Dashboard, logs: LogBuffer) -> Self {
        Self {
            dashboard,
            last_log: None,
            connect_requested: false,
            notice: None,
            should_exit: false,
            logs,
        }
    }

    /// Text shown while the connect prompt is up.
    pub fn connect_hint(&self) -> &'static str {
        match self.dashboard.popup_state() {
            PopupState::Exchanging => "Connecting your eBay account...",
            PopupState::ExchangeFailed => "Authorization failed. Press [c] to try again.",
            _ if self.connect_requested => "Waiting for authorization in your browser...",
            _ => "Press [c] to connect your eBay seller account.",
        }
    }

    fn drain_logs(&mut self) {
        if let Some(line) = self.logs.take().pop() {
            self.last_log = Some(line);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        self.notice = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_exit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_exit = true
            }
            KeyCode::Char('c') if self.dashboard.view() == View::ConnectPrompt => {
                match self.dashboard.connect() {
                    Ok(()) => self.connect_requested = true,
                    Err(e) => self.notice = Some(format!("{:#}", e)),
                }
            }
            KeyCode::Char('n') | KeyCode::Right => self.dashboard.next_page(),
            KeyCode::Char('p') | KeyCode::Left => self.dashboard.prev_page(),
            KeyCode::Char('r') => self.dashboard.reload(),
            _ => {}
        }
    }
}

/// Run the dashboard TUI until the seller quits or the session ends.
pub async fn run(config: &Config, logs: LogBuffer) -> Result<()> {
    let session = dashboard::open_session()?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let dashboard = dashboard::start(config, session, &cancel);
    let mut app = App::new(dashboard, logs);

    // ratatui::init installs a panic hook that restores the terminal.
    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, &mut app).await;
    ratatui::restore();
    result?;

    if app.dashboard.reload_required() {
        anyhow::bail!("Session expired. Run 'ebay-dashboard login'.");
    }
    Ok(())
}

async fn run_app(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    let mut events = EventStream::new();

    while !app.should_exit {
        app.drain_logs();
        terminal.draw(|frame| ui::render(frame, app))?;

        let input = tokio::select! {
            alive = app.dashboard.step() => Input::Stepped(alive),
            event = events.next() => Input::Terminal(event),
        };

        match input {
            Input::Stepped(alive) => {
                if !alive || app.dashboard.reload_required() {
                    app.should_exit = true;
                }
            }
            Input::Terminal(Some(Ok(Event::Key(key)))) if key.kind == KeyEventKind::Press => {
                app.handle_key(key)
            }
            Input::Terminal(Some(Err(e))) => return Err(e.into()),
            Input::Terminal(None) => app.should_exit = true,
            // Resize and the rest redraw on the next pass
            Input::Terminal(Some(Ok(_))) => {}
        }
    }

    Ok(())
}
