//! Installer module
//!
//! Runs one installation from an accepted [`InstallationConfig`]: compile
//! and execute disk.sh, extract the live image, configure the target in a
//! chroot, write fstab, install the bootloader and unmount. Every step is
//! tracked by an [`InstallerContext`].

use crate::config_file::InstallationConfig;
use crate::engine::bootloader::{install_bootloader, BootOutcome};
use crate::engine::fstab::generate_fstab;
use crate::engine::mount::{bind_virtual_filesystems, ensure_efi_mounted, unmount_all, MountEntry};
use crate::engine::storage::{compile_plan, run_disk_script, write_disk_script};
use crate::hardware::{detect_internet, FirmwareMode};
use crate::install_state::{InstallStage, InstallerContext};
use crate::process::CommandRunner;
use crate::system;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where generated artifacts go unless configured otherwise.
pub const DEFAULT_WORK_DIR: &str = "/tmp/alinix";

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub firmware: FirmwareMode,
    /// Directory receiving disk.sh
    pub work_dir: PathBuf,
    /// Live image; searched on the media when `None`
    pub image: Option<PathBuf>,
    /// Resolver configuration copied into the target
    pub resolv_conf: PathBuf,
    /// Probe connectivity (and join Wi-Fi) before apt runs
    pub check_network: bool,
    /// Stop once disk.sh has been echoed; later stages need real mounts
    pub dry_run: bool,
}

impl InstallOptions {
    pub fn new(firmware: FirmwareMode) -> Self {
        Self {
            firmware,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            image: None,
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            check_network: true,
            dry_run: false,
        }
    }
}

/// What a finished installation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// `None` when a dry run stopped after partitioning
    pub boot: Option<BootOutcome>,
    pub script_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Owns the configuration and stage tracking for one run.
pub struct Installer<'a> {
    config: InstallationConfig,
    options: InstallOptions,
    runner: &'a mut dyn CommandRunner,
    context: InstallerContext,
}

impl<'a> Installer<'a> {
    pub fn new(config: InstallationConfig, options: InstallOptions, runner: &'a mut dyn CommandRunner) -> Self {
        let context = InstallerContext::new(options.firmware);
        Self {
            config,
            options,
            runner,
            context,
        }
    }

    pub fn context(&self) -> &InstallerContext {
        &self.context
    }

    /// Run every stage. On error the context is left in `Failed`.
    pub fn run(&mut self) -> Result<InstallReport> {
        match self.run_stages() {
            Ok(report) => Ok(report),
            Err(e) => {
                let stage = self.context.current_stage();
                if let Err(state_err) = self.context.fail() {
                    warn!(stage = %stage, error = %state_err, "could not record the failure");
                }
                Err(e.context(format!("Installation failed during: {}", stage)))
            }
        }
    }

    fn enter(&mut self, stage: InstallStage) -> Result<()> {
        self.context.transition_to(stage)?;
        Ok(())
    }

    fn run_stages(&mut self) -> Result<InstallReport> {
        let firmware = self.options.firmware;
        let root = self.config.tmp_folder.clone();

        self.enter(InstallStage::ValidatingConfig)?;
        self.config.validate().context("Invalid installation configuration")?;
        let plan = compile_plan(&self.config.disks, firmware).context("Failed to compile the partition plan")?;
        let warnings = plan.warnings();
        for warning in &warnings {
            warn!("{}", warning);
        }
        info!("partition plan:\n{}", plan.summary());

        self.context.confirm_destructive_operations();
        self.enter(InstallStage::PartitioningDisk)?;
        fs::create_dir_all(&self.options.work_dir)
            .with_context(|| format!("Failed to create {}", self.options.work_dir.display()))?;
        fs::create_dir_all(&root).with_context(|| format!("Failed to create {}", root.display()))?;
        let script_path = self.options.work_dir.join("disk.sh");
        write_disk_script(&script_path, &plan.render_script(&root))
            .with_context(|| format!("Failed to write {}", script_path.display()))?;
        run_disk_script(self.runner, &script_path).context("disk.sh failed")?;
        let mounts = plan.mounts();

        if self.options.dry_run {
            info!(script = %script_path.display(), "dry run: stopping after the partition step");
            return Ok(InstallReport {
                boot: None,
                script_path,
                warnings,
            });
        }

        self.enter(InstallStage::ExtractingSystem)?;
        let image = match &self.options.image {
            Some(image) => image.clone(),
            None => system::find_squashfs(self.runner, system::SQUASHFS_CANDIDATES)?,
        };
        system::extract_system(self.runner, &image, &root).context("Failed to extract the base system")?;
        if firmware.is_uefi() && !ensure_efi_mounted(self.runner, &mounts, &root) {
            warn!("EFI system partition is not mounted under the target");
        }

        self.enter(InstallStage::ConfiguringChroot)?;
        bind_virtual_filesystems(self.runner, &root, firmware);
        if self.options.check_network {
            self.ensure_network();
        }
        self.configure_target(&root).context("Failed to configure the target system")?;

        self.enter(InstallStage::GeneratingFstab)?;
        generate_fstab(self.runner, &root, &mounts).context("Failed to generate /etc/fstab")?;

        self.enter(InstallStage::InstallingBootloader)?;
        let boot = install_bootloader(self.runner, &root, firmware, &mounts)
            .context("Failed to install a bootloader")?;
        if boot == BootOutcome::DirectKernel {
            warn!("DEGRADED BOOT: the system boots without GRUB");
        }

        self.enter(InstallStage::Finalizing)?;
        self.finalize(&root, &mounts);

        self.enter(InstallStage::Completed)?;
        Ok(InstallReport {
            boot: Some(boot),
            script_path,
            warnings,
        })
    }

    /// Join the configured Wi-Fi when the first probe fails.
    fn ensure_network(&mut self) {
        if detect_internet().is_online() {
            return;
        }
        match &self.config.wifi {
            Some(wifi) => {
                if system::connect_wifi(self.runner, wifi).is_ok() && detect_internet().is_online() {
                    info!(ssid = %wifi.ssid, "connected");
                } else {
                    warn!("still offline, package installation will likely fail");
                }
            }
            None => warn!("no network connectivity, package installation will likely fail"),
        }
    }

    fn configure_target(&mut self, root: &Path) -> crate::error::Result<()> {
        system::copy_dns(&self.options.resolv_conf, root)?;
        system::write_hostname(root, &self.config.user.hostname)?;
        system::write_sources(root, self.config.primary_repo())?;
        if let Some(timezone) = &self.config.timezone {
            system::set_timezone(self.runner, root, timezone)?;
        }
        system::create_user(self.runner, root, &self.config.user)?;
        system::configure_networking(self.runner, root)?;
        system::install_packages(self.runner, root, self.config.desktop, &self.config.apps)?;
        Ok(())
    }

    fn finalize(&mut self, root: &Path, mounts: &[MountEntry]) {
        self.runner.run_lenient("sync", &[]);
        if !unmount_all(self.runner, root) {
            warn!(partitions = mounts.len(), "could not unmount everything under {}", root.display());
        }
        info!("installation complete");
    }
}
