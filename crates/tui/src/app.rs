use std::{
    io, thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use idle_core::{EconomyError, EngineEvent, Game};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const TICK_RATE: Duration = Duration::from_millis(250);

enum AppEvent {
    Input(Event),
    Tick,
}

#[derive(Debug, Default)]
struct UiState {
    cursor: usize,
    status: String,
    last_auto: f64,
    should_quit: bool,
}

impl UiState {
    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }
}

/// Terminal front-end: owns the tick loop and forwards player actions.
pub struct IdleApp {
    game: Game,
    state: UiState,
    last_tick: Instant,
}

impl IdleApp {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            state: UiState {
                status: "Space to dig for gold, Enter to buy, q to quit".to_string(),
                ..UiState::default()
            },
            last_tick: Instant::now(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx);
        self.last_tick = Instant::now();

        let outcome = loop {
            if let Err(err) = terminal.draw(|frame| self.draw(frame)) {
                break Err(err).context("failed to draw frame");
            }
            if self.state.should_quit {
                break Ok(());
            }
            match event_rx.recv().await {
                Some(event) => self.process_app_event(event),
                None => break Ok(()),
            }
        };

        restore_terminal(&mut terminal)?;
        self.game.shutdown()?;
        info!(gold = self.game.engine().gold(), "Session ended");
        outcome
    }

    fn process_app_event(&mut self, event: AppEvent) {
        self.handle_tick();
        if let AppEvent::Input(Event::Key(key)) = event {
            if key.kind == KeyEventKind::Press {
                self.handle_key(key);
            }
        }
        self.handle_engine_events();
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;
        if self.game.tick(elapsed).is_some() {
            self.state.last_auto = self.game.engine().auto_output_per_second();
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.should_quit = true
            }
            KeyCode::Char(' ') => {
                let gained = self.game.tap();
                self.state.set_status(format!("+{}", format_gold(gained)));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.state.cursor = self.state.cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let last = self.game.engine().visible_count().saturating_sub(1);
                self.state.cursor = (self.state.cursor + 1).min(last);
            }
            KeyCode::Enter | KeyCode::Char('b') => self.buy_selected(),
            _ => {}
        }
    }

    fn buy_selected(&mut self) {
        let index = self.state.cursor;
        let Some(name) = self
            .game
            .engine()
            .resource(index)
            .map(|resource| resource.name().to_string())
        else {
            return;
        };
        match self.game.purchase(index) {
            Ok(()) => {
                let level = self
                    .game
                    .engine()
                    .resource(index)
                    .map(|resource| resource.level())
                    .unwrap_or(0);
                debug!(index, level, "Purchase completed");
                self.state.set_status(format!("{name} is now level {level}"));
            }
            Err(EconomyError::InsufficientFunds { required, .. }) => self
                .state
                .set_status(format!("{name} needs {} gold", format_gold(required))),
            Err(err) => self.state.set_status(format!("Cannot buy {name}: {err}")),
        }
    }

    fn handle_engine_events(&mut self) {
        for event in self.game.events() {
            match event {
                EngineEvent::ResourceUnlocked(index) => {
                    if let Some(resource) = self.game.engine().resource(index) {
                        self.state.set_status(format!("{} unlocked!", resource.name()));
                    }
                }
                EngineEvent::ResourceRevealed(index) => {
                    debug!(index, "Resource revealed");
                }
                EngineEvent::MilestoneReached { threshold, .. } => {
                    info!(threshold, "Milestone reached");
                    self.state
                        .set_status(format!("Milestone: {} gold!", format_gold(threshold)));
                }
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(3),
                Constraint::Length(3),
            ])
            .split(frame.size());

        let engine = self.game.engine();
        let header = Paragraph::new(vec![
            Line::from(Span::styled(
                format!("Gold: {}", format_gold(engine.gold())),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(format!(
                "Auto Collect: {}/second",
                format_gold(self.state.last_auto.max(engine.auto_output_per_second()))
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title("Idle Tycoon"));
        frame.render_widget(header, layout[0]);

        let items: Vec<ListItem> = engine
            .resources()
            .iter()
            .take(engine.visible_count())
            .map(|resource| {
                let affordable = engine.affordability_of(resource.index());
                let action = if resource.is_unlocked() {
                    format!(
                        "Lv {:>3}  +{}/tap  upgrade {}",
                        resource.level(),
                        format_gold(resource.output()),
                        format_gold(resource.upgrade_cost())
                    )
                } else {
                    format!("locked  unlock {}", format_gold(resource.unlock_cost()))
                };
                let style = if affordable {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{:<12}", resource.name()), style),
                    Span::raw(action),
                ]))
            })
            .collect();
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Resources"))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        let mut list_state = ListState::default();
        list_state.select(Some(self.state.cursor));
        frame.render_stateful_widget(list, layout[1], &mut list_state);

        let footer = Paragraph::new(self.state.status.as_str())
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(footer, layout[2]);
    }
}

/// Compact gold readout: `999`, `1.50K`, `12.3M`, ...
pub fn format_gold(value: f64) -> String {
    const SUFFIXES: [&str; 7] = ["", "K", "M", "B", "T", "Qa", "Qi"];
    if !value.is_finite() {
        return "∞".to_string();
    }
    let mut scaled = value.max(0.0);
    let mut tier = 0;
    while scaled >= 1000.0 && tier + 1 < SUFFIXES.len() {
        scaled /= 1000.0;
        tier += 1;
    }
    if tier == 0 {
        format!("{}", scaled.floor())
    } else if scaled < 10.0 {
        format!("{scaled:.2}{}", SUFFIXES[tier])
    } else if scaled < 100.0 {
        format!("{scaled:.1}{}", SUFFIXES[tier])
    } else {
        format!("{scaled:.0}{}", SUFFIXES[tier])
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(?err, "Input read failed");
                    break;
                }
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gold_readout_uses_suffixes() {
        assert_eq!(format_gold(0.0), "0");
        assert_eq!(format_gold(999.9), "999");
        assert_eq!(format_gold(1_500.0), "1.50K");
        assert_eq!(format_gold(12_345_678.0), "12.3M");
        assert_eq!(format_gold(250_000_000_000.0), "250B");
        assert_eq!(format_gold(-4.0), "0");
    }
}
