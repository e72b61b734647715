//! Alinix Installer - main entry point
//!
//! Parses the command line, sets up logging and signal handling, then either
//! runs the interactive wizard or a headless install from a JSON document.

use alinix::cli::{Cli, Commands};
use alinix::config_file::InstallationConfig;
use alinix::disk::probe::list_disks;
use alinix::editor::session::status_table;
use alinix::engine::bootloader::BootOutcome;
use alinix::engine::storage::compile_plan;
use alinix::hardware::{detect_firmware_mode, FirmwareMode, HardwareInfo};
use alinix::installer::{InstallOptions, InstallReport, Installer};
use alinix::process::SystemRunner;
use alinix::ui::TerminalPrompter;
use alinix::wizard::run_wizard;
use alinix::process_guard::{self, ProcessGuard};
use alinix::{sanity, InstallerError};

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Headless runs log to stderr; interactive runs log to `log_file` so log
/// lines never land on a drawn prompt.
fn init_logging(debug: bool, log_file: Option<&Path>) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("alinix-installer: cannot open log file {}: {}", path.display(), e))
            .ok()
    });

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let interactive = matches!(cli.command, None | Some(Commands::Install { config: None, .. }));
    init_logging(cli.debug, interactive.then_some(cli.log_file.as_path()));
    info!("Alinix installer starting up");

    // Tracked children (parted, unsquashfs, grub-install) die with us
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");
    let _process_guard = ProcessGuard::new();

    match cli.command {
        Some(Commands::Validate { config }) => validate_command(&config),
        Some(Commands::Plan { config, firmware }) => plan_command(&config, firmware),
        Some(Commands::Disks) => disks_command(),
        Some(Commands::Install {
            config: Some(source),
            ..
        }) => run_headless(&source, cli.dry_run),
        Some(Commands::Install {
            config: None,
            save_config,
        }) => run_interactive(cli.dry_run, save_config.as_deref()),
        None => run_interactive(cli.dry_run, None),
    }
}

/// Load a configuration or exit with status 1.
fn load_or_exit(source: &str) -> InstallationConfig {
    match InstallationConfig::load(source) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!("✗ Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn validate_command(source: &str) -> Result<()> {
    let config = load_or_exit(source);
    match config.validate() {
        Ok(()) => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid ({} disk(s))", config.disks.len());
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("✗ Configuration validation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn plan_command(source: &str, firmware: Option<FirmwareMode>) -> Result<()> {
    let config = load_or_exit(source);
    let firmware = firmware.unwrap_or_else(detect_firmware_mode);
    let plan = compile_plan(&config.disks, firmware).context("Failed to compile the partition plan")?;
    for warning in plan.warnings() {
        eprintln!("warning: {}", warning);
    }
    print!("{}", plan.render_script(&config.tmp_folder));
    Ok(())
}

fn disks_command() -> Result<()> {
    let mut runner = SystemRunner::new();
    let disks = list_disks(&mut runner)?;
    for disk in &disks {
        println!("\n{}", status_table(disk));
    }
    Ok(())
}

fn run_headless(source: &str, dry_run: bool) -> Result<()> {
    info!("Running headless installation");
    let config = load_or_exit(source);
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {:#}", e);
        eprintln!("✗ Configuration validation failed: {:#}", e);
        std::process::exit(1);
    }
    println!("✓ Configuration loaded and validated");

    sanity::run_preflight_checks(dry_run);
    let firmware = detect_firmware_mode();
    install(config, firmware, dry_run)
}

fn run_interactive(dry_run: bool, save_config: Option<&Path>) -> Result<()> {
    sanity::run_preflight_checks(dry_run);

    let hardware = HardwareInfo::detect();
    if !hardware.network.is_online() {
        warn!("no network connectivity, packages may fail to install");
    }

    // lsblk is read-only, so the inventory is probed even in dry-run mode
    let inventory = list_disks(&mut SystemRunner::new()).context("Failed to probe disks")?;

    let mut prompter = TerminalPrompter::new();
    let config = match run_wizard(&mut prompter, hardware.firmware, &inventory) {
        Ok(config) => config,
        Err(InstallerError::UserAborted) => {
            info!("installation cancelled by the user");
            println!("Installation cancelled. Nothing was changed.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = save_config {
        config.save_to_file(path)?;
        println!("✓ Configuration saved to {}", path.display());
        println!("  Re-run it with: alinix-installer install --config {}", path.display());
    }

    install(config, hardware.firmware, dry_run)
}

fn install(config: InstallationConfig, firmware: FirmwareMode, dry_run: bool) -> Result<()> {
    let mut runner = SystemRunner::new().dry_run(dry_run);
    let mut options = InstallOptions::new(firmware);
    options.dry_run = dry_run;
    let mut installer = Installer::new(config, options, &mut runner);

    match installer.run() {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("\n✗ {:#}", e);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &InstallReport) {
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    match report.boot {
        None => println!("\n✓ Dry run finished after the partition step."),
        Some(BootOutcome::Grub) => println!("\n✓ Installation completed successfully!"),
        Some(BootOutcome::DirectKernel) => {
            println!("\n✓ Installation completed, but GRUB could not be installed.");
            println!("  The firmware boots the kernel directly; install GRUB later for a boot menu.");
        }
    }
    println!("  Disk script kept at {}", report.script_path.display());
}
