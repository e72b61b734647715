use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::hardware::FirmwareMode;

/// Alinix Installer - partitions disks, provisions the system and installs a bootloader
#[derive(Parser)]
#[command(name = "alinix-installer")]
#[command(about = "Terminal installer for Alinix")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: print every command instead of executing it.
    ///
    /// The disk inventory is still probed with lsblk so the wizard has
    /// real disks to edit.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log file used while the interactive installer owns the terminal
    #[arg(long, global = true, default_value = "/tmp/alinix.log")]
    pub log_file: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the installer (interactive unless --config is given)
    Install {
        /// Configuration file, or inline JSON starting with '{' (skips the wizard)
        #[arg(short, long)]
        config: Option<String>,

        /// Save the configuration collected by the wizard to this file
        #[arg(long)]
        save_config: Option<PathBuf>,
    },
    /// Validate a configuration file or inline JSON
    Validate {
        /// Path to configuration file, or inline JSON
        config: String,
    },
    /// Print the disk.sh a configuration compiles to, without running it
    Plan {
        /// Path to configuration file, or inline JSON
        config: String,

        /// Firmware to compile for (defaults to the running machine's)
        #[arg(long)]
        firmware: Option<FirmwareMode>,
    },
    /// List the disks and partitions found on this machine
    Disks,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_args() {
        // No subcommand runs the interactive installer
        let cli = Cli::try_parse_from(["alinix-installer"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.dry_run);
        assert_eq!(cli.log_file, PathBuf::from("/tmp/alinix.log"));
    }

    #[test]
    fn test_cli_install_with_config() {
        let cli = Cli::try_parse_from([
            "alinix-installer",
            "install",
            "--config",
            "/path/to/config.json",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.dry_run);
        match cli.command {
            Some(Commands::Install { config, save_config }) => {
                assert_eq!(config.as_deref(), Some("/path/to/config.json"));
                assert!(save_config.is_none());
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_validate_command() {
        let cli = Cli::try_parse_from(["alinix-installer", "validate", "{\"user\": {}}"]).unwrap();
        match cli.command {
            Some(Commands::Validate { config }) => assert!(config.starts_with('{')),
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_cli_plan_firmware() {
        let cli = Cli::try_parse_from(["alinix-installer", "--debug", "plan", "c.json", "--firmware", "bios"]).unwrap();
        assert!(cli.debug);
        match cli.command {
            Some(Commands::Plan { firmware, .. }) => assert_eq!(firmware, Some(FirmwareMode::Bios)),
            _ => panic!("Expected Plan command"),
        }
        assert!(Cli::try_parse_from(["alinix-installer", "plan", "c.json", "--firmware", "coreboot"]).is_err());
    }
}
