//! The interactive surface the editor and wizard are written against.
//!
//! [`Prompter`] is implemented by the terminal UI and by
//! [`ScriptedPrompter`], which replays a fixed list of answers.

use crate::error::{InstallerError, Result};
use std::collections::VecDeque;

/// One entry of a selection menu.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuOption<T> {
    pub label: String,
    pub value: T,
}

impl<T> MenuOption<T> {
    pub fn new(label: impl Into<String>, value: T) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Validator for free-text answers. `Err` carries the message shown to the user.
pub type TextValidator<'a> = &'a dyn Fn(&str) -> std::result::Result<(), String>;

pub trait Prompter {
    /// Pick one of `labels`, returning its index.
    fn select(&mut self, message: &str, labels: &[String]) -> Result<usize>;

    fn confirm(&mut self, message: &str, default: bool) -> Result<bool>;

    /// A number in `min..=max`. Out-of-range input is never returned.
    fn number(&mut self, message: &str, min: f64, max: f64) -> Result<f64>;

    /// Free text accepted by `validate`.
    fn text(&mut self, message: &str, validate: TextValidator<'_>) -> Result<String>;

    /// Hidden input (passwords).
    fn secret(&mut self, message: &str) -> Result<String>;

    /// Show a message that needs no answer.
    fn notify(&mut self, message: &str);
}

/// Ask `prompter` to pick one of `options` and return its value.
pub fn choose<T: Clone>(prompter: &mut dyn Prompter, message: &str, options: &[MenuOption<T>]) -> Result<T> {
    if options.is_empty() {
        return Err(InstallerError::prompt(format!("no options for: {}", message)));
    }
    let labels: Vec<String> = options.iter().map(|o| o.label.clone()).collect();
    let index = prompter.select(message, &labels)?;
    options
        .get(index)
        .map(|o| o.value.clone())
        .ok_or_else(|| InstallerError::prompt(format!("selection {} out of range", index)))
}

/// A scripted answer for [`ScriptedPrompter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Choose the first option whose label contains this text
    Select(String),
    Confirm(bool),
    Number(f64),
    Text(String),
}

/// Replays answers in order. Every prompt and notification is recorded.
///
/// A prompt whose next answer has the wrong kind, an exhausted queue, an
/// out-of-range number or rejected text all fail with `Prompt`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    pub prompts: Vec<String>,
    pub notices: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    /// True if any notification contains `needle`.
    pub fn notified(&self, needle: &str) -> bool {
        self.notices.iter().any(|n| n.contains(needle))
    }

    fn next(&mut self, message: &str) -> Result<Answer> {
        self.prompts.push(message.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| InstallerError::prompt(format!("no scripted answer for: {}", message)))
    }

    fn mismatch(message: &str, answer: &Answer) -> InstallerError {
        InstallerError::prompt(format!("unexpected answer {:?} for: {}", answer, message))
    }
}

impl Prompter for ScriptedPrompter {
    fn select(&mut self, message: &str, labels: &[String]) -> Result<usize> {
        match self.next(message)? {
            Answer::Select(wanted) => labels
                .iter()
                .position(|label| label.contains(&wanted))
                .ok_or_else(|| {
                    InstallerError::prompt(format!("no option matching {:?} in {:?}", wanted, labels))
                }),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn confirm(&mut self, message: &str, _default: bool) -> Result<bool> {
        match self.next(message)? {
            Answer::Confirm(value) => Ok(value),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn number(&mut self, message: &str, min: f64, max: f64) -> Result<f64> {
        match self.next(message)? {
            Answer::Number(value) if (min..=max).contains(&value) => Ok(value),
            Answer::Number(value) => Err(InstallerError::prompt(format!(
                "{} is outside {}..={} for: {}",
                value, min, max, message
            ))),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn text(&mut self, message: &str, validate: TextValidator<'_>) -> Result<String> {
        match self.next(message)? {
            Answer::Text(value) => {
                validate(&value).map_err(InstallerError::prompt)?;
                Ok(value)
            }
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn secret(&mut self, message: &str) -> Result<String> {
        match self.next(message)? {
            Answer::Text(value) => Ok(value),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_by_label() {
        let mut prompter = ScriptedPrompter::new([Answer::Select("home".into())]);
        let options = vec![MenuOption::new("/", 0), MenuOption::new("/home", 1)];
        assert_eq!(choose(&mut prompter, "Mount point", &options).expect("scripted"), 1); // test: scripted answer
        assert_eq!(prompter.prompts, vec!["Mount point"]);
    }

    #[test]
    fn test_number_rejects_out_of_range() {
        let mut prompter = ScriptedPrompter::new([Answer::Number(50.0)]);
        assert!(prompter.number("Size", 0.1, 10.0).is_err());
    }

    #[test]
    fn test_kind_mismatch_fails() {
        let mut prompter = ScriptedPrompter::new([Answer::Confirm(true)]);
        assert!(prompter.number("Size", 0.0, 1.0).is_err());
    }

    #[test]
    fn test_text_runs_validator() {
        let check: TextValidator<'_> = &|s: &str| {
            if s.starts_with('/') { Ok(()) } else { Err("must be absolute".to_string()) }
        };
        let mut prompter = ScriptedPrompter::new([Answer::Text("data".into()), Answer::Text("/data".into())]);
        assert!(prompter.text("Path", check).is_err());
        assert_eq!(prompter.text("Path", check).expect("valid"), "/data"); // test: scripted answer
    }

    #[test]
    fn test_exhausted_queue() {
        let mut prompter = ScriptedPrompter::default();
        assert!(prompter.confirm("Continue?", false).is_err());
    }
}
