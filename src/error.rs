//! Error handling module for the installer
//!
//! Every failure the installer can surface is one of these variants. The
//! categories stay distinct so callers can tell a bad plan from a failed
//! command or a bootloader that refused to install.

use crate::disk::validate::ValidationIssue;
use thiserror::Error;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// IO errors (file operations, terminal, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (loading, parsing, shape)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The partition plan breaks one or more invariants
    #[error("Invalid partition plan:\n{}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// A partition could not be turned into shell operations
    #[error("Cannot compile partition {partition}: {reason}")]
    Compile { partition: String, reason: String },

    /// An external command exited unsuccessfully or could not be spawned
    #[error("Command failed: {command} {} (exit code {})\n{stderr}", .args.join(" "), format_code(.code))]
    Exec {
        command: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },

    /// A freshly created partition node never appeared
    #[error("Device {device} did not appear after {attempts} attempts")]
    DeviceTimeout { device: String, attempts: u32 },

    /// Bootloader installation or registration failed
    #[error("Bootloader installation failed: {0}")]
    Bootloader(String),

    /// Interactive prompt failures (terminal gone, scripted answer mismatch)
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// The user backed out of an interactive flow
    #[error("Cancelled by user")]
    UserAborted,
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

// Convenient error constructors
impl InstallerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a compile error for a named partition
    pub fn compile(partition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Compile {
            partition: partition.into(),
            reason: reason.into(),
        }
    }

    /// Create a bootloader error
    pub fn bootloader(msg: impl Into<String>) -> Self {
        Self::Bootloader(msg.into())
    }

    /// Create a prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Returns true for failures the user caused on purpose
    pub fn is_user_abort(&self) -> bool {
        matches!(self, Self::UserAborted)
    }
}
