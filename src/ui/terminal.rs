//! ratatui front end for the [`Prompter`] trait.
//!
//! The alternate screen is held only while a question is on screen, so
//! command output printed between prompts lands on the normal terminal.

use crate::editor::prompt::{Prompter, TextValidator};
use crate::error::{InstallerError, Result};
use crate::theme::{Styles, UiConstants};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io::{self, Stdout};
use tracing::{debug, info};

const BACK: &str = "Back";

/// What the lower panel shows.
enum Body<'a> {
    List { labels: &'a [String], selected: usize },
    Confirm { yes: bool },
    Input { value: &'a str, masked: bool, hint: &'a str, error: Option<&'a str> },
}

/// Raw mode plus alternate screen, restored on drop.
struct Screen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Screen {
    fn open() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Interactive prompter drawing one question at a time.
#[derive(Debug, Default)]
pub struct TerminalPrompter {
    notices: Vec<String>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_notice(&mut self, message: &str) {
        self.notices.extend(message.lines().map(str::to_string));
        let excess = self.notices.len().saturating_sub(UiConstants::NOTICE_LINES);
        self.notices.drain(..excess);
    }

    fn read_line(
        &mut self,
        message: &str,
        masked: bool,
        hint: &str,
        check: &dyn Fn(&str) -> std::result::Result<(), String>,
    ) -> Result<String> {
        let mut screen = Screen::open()?;
        let mut value = String::new();
        let mut error: Option<String> = None;

        loop {
            let notices = &self.notices;
            let body = Body::Input {
                value: &value,
                masked,
                hint,
                error: error.as_deref(),
            };
            screen.terminal.draw(|f| render(f, notices, message, &body))?;

            let key = next_key()?;
            match key.code {
                KeyCode::Enter => match check(&value) {
                    Ok(()) => return Ok(value),
                    Err(reason) => error = Some(reason),
                },
                KeyCode::Backspace => {
                    value.pop();
                    error = None;
                }
                KeyCode::Esc => {
                    value.clear();
                    error = None;
                }
                KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    value.push(c);
                    error = None;
                }
                _ => {}
            }
        }
    }
}

impl Prompter for TerminalPrompter {
    fn select(&mut self, message: &str, labels: &[String]) -> Result<usize> {
        if labels.is_empty() {
            return Err(InstallerError::prompt(format!("nothing to choose for '{}'", message)));
        }
        let mut screen = Screen::open()?;
        let last = labels.len() - 1;
        let mut selected = 0;

        loop {
            let notices = &self.notices;
            let body = Body::List { labels, selected };
            screen.terminal.draw(|f| render(f, notices, message, &body))?;

            match next_key()?.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    selected = if selected == 0 { last } else { selected - 1 };
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    selected = if selected == last { 0 } else { selected + 1 };
                }
                KeyCode::Home => selected = 0,
                KeyCode::End => selected = last,
                KeyCode::Enter => {
                    debug!(prompt = message, choice = %labels[selected], "selected");
                    return Ok(selected);
                }
                KeyCode::Esc => {
                    if let Some(back) = labels.iter().position(|l| l == BACK) {
                        return Ok(back);
                    }
                }
                _ => {}
            }
        }
    }

    fn confirm(&mut self, message: &str, default: bool) -> Result<bool> {
        let mut screen = Screen::open()?;
        let mut yes = default;

        loop {
            let notices = &self.notices;
            screen
                .terminal
                .draw(|f| render(f, notices, message, &Body::Confirm { yes }))?;

            match next_key()?.code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => yes = !yes,
                KeyCode::Char('y') | KeyCode::Char('Y') => return Ok(true),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => return Ok(false),
                KeyCode::Enter => return Ok(yes),
                _ => {}
            }
        }
    }

    fn number(&mut self, message: &str, min: f64, max: f64) -> Result<f64> {
        let hint = format!("Between {:.2} and {:.2}", min, max);
        let raw = self.read_line(message, false, &hint, &|input: &str| {
            parse_number(input, min, max).map(|_| ())
        })?;
        parse_number(&raw, min, max).map_err(InstallerError::prompt)
    }

    fn text(&mut self, message: &str, validate: TextValidator<'_>) -> Result<String> {
        self.read_line(message, false, "", validate)
    }

    fn secret(&mut self, message: &str) -> Result<String> {
        self.read_line(message, true, "Input is hidden", &|input: &str| {
            if input.is_empty() {
                Err("value cannot be empty".to_string())
            } else {
                Ok(())
            }
        })
    }

    fn notify(&mut self, message: &str) {
        info!("{}", message);
        self.push_notice(message);
    }
}

fn next_key() -> Result<KeyEvent> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                return Err(InstallerError::UserAborted);
            }
            return Ok(key);
        }
    }
}

/// Parse a decimal answer and check it against the allowed range.
pub fn parse_number(input: &str, min: f64, max: f64) -> std::result::Result<f64, String> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", input.trim()))?;
    if !value.is_finite() || value < min || value > max {
        return Err(format!("enter a value between {:.2} and {:.2}", min, max));
    }
    Ok(value)
}

fn centered(area: Rect) -> Rect {
    let width = area.width.min(UiConstants::MAX_PANEL_WIDTH);
    Rect::new(area.x + (area.width - width) / 2, area.y, width, area.height)
}

fn render(f: &mut Frame, notices: &[String], message: &str, body: &Body) {
    let area = centered(f.area());
    let notice_height = if notices.is_empty() { 0 } else { notices.len() as u16 + 2 };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(notice_height),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(area);

    let header = Paragraph::new(Line::from(Span::styled(" Alinix Installer ", Styles::title())))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Styles::border_active()),
        )
        .style(Styles::panel_bg());
    f.render_widget(header, chunks[0]);

    if !notices.is_empty() {
        let lines: Vec<Line> = notices
            .iter()
            .map(|n| Line::from(Span::styled(n.as_str(), Styles::warning())))
            .collect();
        let panel = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(" Notices "))
            .style(Styles::panel_bg_alt());
        f.render_widget(panel, chunks[1]);
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Styles::border_active())
        .title(Span::styled(format!(" {} ", message), Styles::prompt()))
        .style(Styles::panel_bg());

    let hint = match body {
        Body::List { labels, selected } => {
            let items: Vec<ListItem> = labels
                .iter()
                .map(|l| ListItem::new(Line::from(Span::styled(l.as_str(), Styles::text()))))
                .collect();
            let list = List::new(items)
                .block(block)
                .highlight_style(Styles::selected())
                .highlight_symbol("> ");
            let mut state = ListState::default().with_selected(Some(*selected));
            f.render_stateful_widget(list, chunks[2], &mut state);
            "↑/↓ move • Enter select • Esc back • Ctrl+C quit"
        }
        Body::Confirm { yes } => {
            let (yes_style, no_style) = if *yes {
                (Styles::button_confirm(), Styles::button_inactive())
            } else {
                (Styles::button_inactive(), Styles::button_cancel())
            };
            let buttons = Paragraph::new(Line::from(vec![
                Span::styled("  Yes  ", yes_style),
                Span::raw("    "),
                Span::styled("  No  ", no_style),
            ]))
            .alignment(Alignment::Center)
            .block(block);
            f.render_widget(buttons, chunks[2]);
            "←/→ toggle • y/n answer • Enter confirm"
        }
        Body::Input { value, masked, hint, error } => {
            let shown = if *masked { "*".repeat(value.chars().count()) } else { value.to_string() };
            let mut lines = vec![Line::from(vec![
                Span::styled("> ", Styles::prompt()),
                Span::styled(shown, Styles::text()),
            ])];
            if !hint.is_empty() {
                lines.push(Line::from(Span::styled(*hint, Styles::nav_hint())));
            }
            if let Some(error) = error {
                lines.push(Line::from(Span::styled(*error, Styles::error())));
            }
            f.render_widget(Paragraph::new(lines).block(block), chunks[2]);
            "Enter submit • Esc clear • Ctrl+C quit"
        }
    };

    f.render_widget(
        Paragraph::new(Span::styled(hint, Styles::nav_hint())).alignment(Alignment::Center),
        chunks[3],
    );
}
