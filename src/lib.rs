//! Alinix Installer Library
//!
//! Disk model, partition editor, layout compiler and the provisioning engine
//! behind the Alinix terminal installer.

pub mod cli;
pub mod config_file;
pub mod disk;
pub mod editor;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod install_state;
pub mod installer;
pub mod process;
pub mod process_guard;
pub mod sanity;
pub mod system;
pub mod theme;
pub mod types;
pub mod ui;
pub mod wizard;

// Re-export main types for convenience
pub use config_file::InstallationConfig;
pub use disk::{Disk, Partition, PartitionSize, ValidationIssue};
pub use error::{InstallerError, Result};
pub use install_state::{InstallStage, InstallTransitionError, InstallerContext};
pub use installer::{InstallOptions, InstallReport, Installer};
pub use process::{CommandOutput, CommandRunner, CommandSpec, RecordingRunner, SystemRunner};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use types::{DesktopEnvironment, FileSystemKind, TableKind};

// Hardware detection
pub use hardware::{FirmwareMode, HardwareInfo, NetworkState};

// Layout compiler and bootloader
pub use engine::bootloader::{install_bootloader, BootOutcome};
pub use engine::storage::{compile_disk, compile_plan, CompiledPlan, StorageOp, StoragePlan};

// Partition editor
pub use editor::{configure_storage, Prompter};
