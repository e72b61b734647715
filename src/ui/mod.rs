//! Terminal user interface.

pub mod terminal;

pub use terminal::TerminalPrompter;
