//! Colors and styles for the terminal prompts
//!
//! Every color the prompter draws with is defined here rather than inline.

use ratatui::style::{Color, Modifier, Style};

// =============================================================================
// COLOR PALETTE
// =============================================================================

pub struct Colors;

impl Colors {
    /// Background of every prompt panel
    pub const BG_PRIMARY: Color = Color::Rgb(20, 20, 30);

    /// Background of the notice panel
    pub const BG_SECONDARY: Color = Color::Rgb(30, 30, 40);

    pub const FG_PRIMARY: Color = Color::White;
    pub const FG_MUTED: Color = Color::DarkGray;

    /// Brand color (titles, active borders)
    pub const PRIMARY: Color = Color::Cyan;

    /// Prompt message
    pub const SECONDARY: Color = Color::Yellow;

    pub const SELECTED_BG: Color = Color::Cyan;
    pub const SELECTED_FG: Color = Color::Black;

    pub const SUCCESS: Color = Color::Green;
    pub const WARNING: Color = Color::Yellow;
    pub const ERROR: Color = Color::Red;
}

// =============================================================================
// STYLES
// =============================================================================

pub struct Styles;

impl Styles {
    pub fn text() -> Style {
        Style::default().fg(Colors::FG_PRIMARY)
    }

    /// Main title style (cyan, bold)
    pub fn title() -> Style {
        Style::default()
            .fg(Colors::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    /// The question being asked
    pub fn prompt() -> Style {
        Style::default()
            .fg(Colors::SECONDARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn border_active() -> Style {
        Style::default().fg(Colors::PRIMARY)
    }

    pub fn panel_bg() -> Style {
        Style::default().bg(Colors::BG_PRIMARY)
    }

    pub fn panel_bg_alt() -> Style {
        Style::default().bg(Colors::BG_SECONDARY)
    }

    /// Highlighted list row
    pub fn selected() -> Style {
        Style::default()
            .fg(Colors::SELECTED_FG)
            .bg(Colors::SELECTED_BG)
            .add_modifier(Modifier::BOLD)
    }

    /// Yes button (selected)
    pub fn button_confirm() -> Style {
        Style::default()
            .fg(Colors::SELECTED_FG)
            .bg(Colors::SUCCESS)
            .add_modifier(Modifier::BOLD)
    }

    /// No button (selected)
    pub fn button_cancel() -> Style {
        Style::default()
            .fg(Colors::FG_PRIMARY)
            .bg(Colors::ERROR)
            .add_modifier(Modifier::BOLD)
    }

    pub fn button_inactive() -> Style {
        Style::default().fg(Colors::FG_PRIMARY)
    }

    pub fn warning() -> Style {
        Style::default().fg(Colors::WARNING)
    }

    pub fn error() -> Style {
        Style::default().fg(Colors::ERROR)
    }

    /// Keybinding hint line
    pub fn nav_hint() -> Style {
        Style::default().fg(Colors::FG_MUTED)
    }
}

/// Dimensions shared by the prompt layouts
pub struct UiConstants;

impl UiConstants {
    /// Notices kept on screen above the prompt
    pub const NOTICE_LINES: usize = 8;

    /// Widest a prompt panel grows
    pub const MAX_PANEL_WIDTH: u16 = 100;
}
