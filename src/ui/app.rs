use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{backend::CrosstermBackend, Frame, Terminal};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use super::layout::TuiLayout;
use super::views;
use crate::database::PortfolioStore;
use crate::models::PortfolioSnapshot;

const TAB_TITLES: [&str; 2] = ["Spółki", "Sektory"];
const INPUT_POLL: Duration = Duration::from_millis(200);

/// Read-only view of the stored snapshot
pub struct DashboardApp {
    store: Arc<dyn PortfolioStore>,
    pub snapshot: PortfolioSnapshot,
    pub selected_tab: usize,
    pub should_quit: bool,
    pub last_error: Option<String>,
}

impl DashboardApp {
    pub fn new(store: Arc<dyn PortfolioStore>) -> Self {
        Self {
            store,
            snapshot: PortfolioSnapshot::default(),
            selected_tab: 0,
            should_quit: false,
            last_error: None,
        }
    }

    /// Re-read the snapshot; a failed read keeps the previous one on screen
    pub async fn reload(&mut self) {
        let constituents = self.store.load_snapshot().await;
        let updated_at = self.store.last_snapshot_timestamp().await;

        match (constituents, updated_at) {
            (Ok(constituents), Ok(updated_at)) => {
                self.snapshot = PortfolioSnapshot { constituents, updated_at };
                self.last_error = None;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Dashboard reload failed: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    pub fn draw(&self, f: &mut Frame) {
        let layout = TuiLayout::new(f.area());
        layout.render_tab_bar(f, &TAB_TITLES, self.selected_tab);

        if self.snapshot.is_empty() {
            views::render_empty(f, layout.content);
        } else {
            match self.selected_tab {
                1 => views::render_sectors(f, layout.content, &self.snapshot.constituents),
                _ => views::render_companies(f, layout.content, &self.snapshot.constituents),
            }
        }

        layout.render_status_bar(f, &self.status_text());
    }

    pub fn status_text(&self) -> String {
        if let Some(err) = &self.last_error {
            return format!("Błąd odczytu bazy: {}", err);
        }
        format!(
            "{} spółek • suma udziałów {:.2}% • ostatnia aktualizacja: {}",
            self.snapshot.constituents.len(),
            self.snapshot.total_share(),
            format_timestamp(self.snapshot.updated_at)
        )
    }

    /// Returns `true` when the snapshot should be reloaded right away
    pub fn handle_key_event(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::Right => self.next_tab(),
            KeyCode::BackTab | KeyCode::Left => self.previous_tab(),
            KeyCode::Char('1') => self.selected_tab = 0,
            KeyCode::Char('2') => self.selected_tab = 1,
            KeyCode::Char('r') | KeyCode::Char('R') => return true,
            _ => {}
        }
        false
    }

    fn next_tab(&mut self) {
        self.selected_tab = (self.selected_tab + 1) % TAB_TITLES.len();
    }

    fn previous_tab(&mut self) {
        self.selected_tab = if self.selected_tab == 0 {
            TAB_TITLES.len() - 1
        } else {
            self.selected_tab - 1
        };
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "brak".to_string(),
    }
}

/// Run the dashboard until the user quits, reloading every `poll_interval`.
///
/// Needs the multi-threaded runtime: terminal input is polled with
/// `block_in_place`.
pub async fn run_dashboard(store: Arc<dyn PortfolioStore>, poll_interval: Duration) -> Result<()> {
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = DashboardApp::new(store);
    app.reload().await;
    let mut last_reload = Instant::now();

    let result: Result<()> = async {
        loop {
            terminal.draw(|f| app.draw(f))?;

            let input = tokio::task::block_in_place(|| -> io::Result<Option<Event>> {
                if event::poll(INPUT_POLL)? {
                    Ok(Some(event::read()?))
                } else {
                    Ok(None)
                }
            })?;

            let mut reload_now = false;
            if let Some(Event::Key(key)) = input {
                if key.kind == KeyEventKind::Press {
                    reload_now = app.handle_key_event(key.code);
                }
            }

            if app.should_quit {
                break Ok(());
            }

            if reload_now || last_reload.elapsed() >= poll_interval {
                app.reload().await;
                last_reload = Instant::now();
            }
        }
    }
    .await;

    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}
