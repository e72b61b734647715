//! Install stage tracking
//!
//! The pipeline moves forward one stage at a time and can fail from any
//! non-terminal stage. Stages cannot be skipped or revisited.
//!
//! ```text
//! NotStarted
//!     ↓
//! ValidatingConfig
//!     ↓
//! PartitioningDisk      (destructive, needs confirmation)
//!     ↓
//! ExtractingSystem
//!     ↓
//! ConfiguringChroot
//!     ↓
//! GeneratingFstab
//!     ↓
//! InstallingBootloader
//!     ↓
//! Finalizing
//!     ↓
//! Completed
//!
//! (Any stage can transition to Failed)
//! ```

use crate::hardware::FirmwareMode;
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    NotStarted = 0,

    /// Checking the configuration and the partition plan
    ValidatingConfig = 1,

    /// Running the generated disk.sh
    /// This is a DESTRUCTIVE stage - requires explicit confirmation
    PartitioningDisk = 2,

    /// Unpacking the live image into the provisioning root
    ExtractingSystem = 3,

    /// DNS, timezone, apt sources, user, applications
    ConfiguringChroot = 4,

    GeneratingFstab = 5,

    InstallingBootloader = 6,

    /// Sync and unmount
    Finalizing = 7,

    Completed = 8,

    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[inline]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::PartitioningDisk)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::ValidatingConfig),
            Self::ValidatingConfig => Some(Self::PartitioningDisk),
            Self::PartitioningDisk => Some(Self::ExtractingSystem),
            Self::ExtractingSystem => Some(Self::ConfiguringChroot),
            Self::ConfiguringChroot => Some(Self::GeneratingFstab),
            Self::GeneratingFstab => Some(Self::InstallingBootloader),
            Self::InstallingBootloader => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::ValidatingConfig => "Validating configuration",
            Self::PartitioningDisk => "Partitioning disks",
            Self::ExtractingSystem => "Extracting base system",
            Self::ConfiguringChroot => "Configuring system",
            Self::GeneratingFstab => "Generating fstab",
            Self::InstallingBootloader => "Installing bootloader",
            Self::Finalizing => "Finalizing installation",
            Self::Completed => "Installation complete",
            Self::Failed => "Installation failed",
        }
    }

    /// Approximate progress shown next to the stage name
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::ValidatingConfig => 5,
            Self::PartitioningDisk => 15,
            Self::ExtractingSystem => 30,
            Self::ConfiguringChroot => 60,
            Self::GeneratingFstab => 75,
            Self::InstallingBootloader => 85,
            Self::Finalizing => 95,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    /// All stages in order, without `Failed`
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::ValidatingConfig,
            Self::PartitioningDisk,
            Self::ExtractingSystem,
            Self::ConfiguringChroot,
            Self::GeneratingFstab,
            Self::InstallingBootloader,
            Self::Finalizing,
            Self::Completed,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: InstallStage, to: InstallStage },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: InstallStage, to: InstallStage },

    #[error("Cannot leave terminal stage {from}")]
    FromTerminalState { from: InstallStage },

    #[error("Stage {stage} requires explicit confirmation (destructive operation)")]
    MissingConfirmation { stage: InstallStage },
}

/// Owns the current stage of one installation run.
#[derive(Debug, Clone)]
pub struct InstallerContext {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    /// (stage, unix timestamp) for every stage entered
    stage_history: Vec<(InstallStage, u64)>,
    destructive_confirmed: bool,
    firmware_mode: FirmwareMode,
}

impl InstallerContext {
    pub fn new(firmware_mode: FirmwareMode) -> Self {
        Self {
            current: InstallStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(InstallStage::all_stages().len()),
            destructive_confirmed: false,
            firmware_mode,
        }
    }

    #[inline]
    pub fn firmware_mode(&self) -> FirmwareMode {
        self.firmware_mode
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == InstallStage::Completed
    }

    pub fn stage_history(&self) -> &[(InstallStage, u64)] {
        &self.stage_history
    }

    /// Must be called before entering `PartitioningDisk`. Cannot be revoked.
    pub fn confirm_destructive_operations(&mut self) {
        self.destructive_confirmed = true;
    }

    /// Enter `target`, which must be the stage right after the current one.
    pub fn transition_to(&mut self, target: InstallStage) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if target != InstallStage::Failed && target.order() <= self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        if target.is_destructive() && !self.destructive_confirmed {
            return Err(InstallTransitionError::MissingConfirmation { stage: target });
        }

        info!(
            stage = %target,
            progress = target.progress_percent(),
            "[{}/{}] {}",
            target.order(),
            InstallStage::Completed.order(),
            target
        );
        self.record(target);
        self.current = target;
        Ok(target)
    }

    /// Mark the run failed at the current stage.
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        error!(stage = %self.current, "installation failed");
        self.failed_at = Some(self.current);
        self.record(InstallStage::Failed);
        self.current = InstallStage::Failed;
        Ok(())
    }

    fn record(&mut self, stage: InstallStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.stage_history.push((stage, timestamp));
    }
}

impl From<InstallTransitionError> for crate::error::InstallerError {
    fn from(err: InstallTransitionError) -> Self {
        crate::error::InstallerError::config(err.to_string())
    }
}
