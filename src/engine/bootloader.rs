//! Bootloader installation.
//!
//! UEFI installs `grub-efi` to the EFI system partition and registers an
//! NVRAM entry labelled [`BOOTLOADER_ID`]. BIOS installs `grub-pc` to the
//! whole disk that holds root. Both validate the generated `grub.cfg` and
//! write a minimal one by hand when it has no boot entries.
//!
//! When GRUB fails under UEFI, [`install_bootloader`] copies the kernel and
//! initrd onto the ESP and registers an entry that boots the kernel directly.
//! That outcome is reported as [`BootOutcome::DirectKernel`] and logged as a
//! degraded boot.

use super::mount::{MountEntry, EFI_MOUNT_POINT};
use crate::disk::naming::{partition_index, whole_disk_device};
use crate::error::{InstallerError, Result};
use crate::hardware::FirmwareMode;
use crate::process::CommandRunner;
use crate::system::{apt_install, chroot};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Label of the NVRAM entry and directory name under `EFI/`.
pub const BOOTLOADER_ID: &str = "Alinix";

/// A `grub.cfg` smaller than this is treated as broken.
pub const MIN_GRUB_CFG_BYTES: usize = 100;

const GRUB_CFG: &str = "boot/grub/grub.cfg";
const DEFAULT_GRUB: &str = "etc/default/grub";

const KERNEL_CMDLINE: &str = "quiet splash components fsck.mode=skip";

const UEFI_PACKAGES: &[&str] = &["grub-efi-amd64", "grub-efi-amd64-bin", "efibootmgr", "os-prober"];
const BIOS_PACKAGES: &[&str] = &["grub-pc", "grub-pc-bin", "os-prober"];

const DEFAULT_GRUB_CONTENTS: &str = "GRUB_DEFAULT=0
GRUB_TIMEOUT=5
GRUB_DISTRIBUTOR=\"Alinix\"
GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash components fsck.mode=skip\"
GRUB_CMDLINE_LINUX=\"\"
GRUB_TERMINAL=console
GRUB_DISABLE_OS_PROBER=false
";

/// How the installed system will boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// GRUB installed and registered normally
    Grub,
    /// GRUB failed; firmware loads the kernel straight from the ESP
    DirectKernel,
}

impl fmt::Display for BootOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grub => write!(f, "GRUB"),
            Self::DirectKernel => write!(f, "direct kernel boot (degraded)"),
        }
    }
}

/// Devices the bootloader needs, resolved from the mount plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootTargets {
    pub root_device: String,
    /// Whole disk the ESP lives on (UEFI) or GRUB's install disk (BIOS).
    pub disk: String,
    /// ESP device and its partition number, UEFI only.
    pub efi: Option<(String, u32)>,
}

/// Find root and, under UEFI, the ESP in the mount plan.
pub fn resolve_targets(mounts: &[MountEntry], firmware: FirmwareMode) -> Result<BootTargets> {
    let root_device = mounts
        .iter()
        .find(|m| m.mount_point == "/")
        .map(|m| m.device.clone())
        .ok_or_else(|| InstallerError::bootloader("no root partition in the mount plan"))?;

    match firmware {
        FirmwareMode::Uefi => {
            let esp = mounts
                .iter()
                .find(|m| m.mount_point == EFI_MOUNT_POINT)
                .ok_or_else(|| InstallerError::bootloader("EFI partition not found"))?;
            let number = partition_index(&esp.device).ok_or_else(|| {
                InstallerError::bootloader(format!("cannot read partition number of {}", esp.device))
            })?;
            Ok(BootTargets {
                root_device,
                disk: whole_disk_device(&esp.device),
                efi: Some((esp.device.clone(), number)),
            })
        }
        FirmwareMode::Bios => Ok(BootTargets {
            disk: whole_disk_device(&root_device),
            root_device,
            efi: None,
        }),
    }
}

/// Kernel and initrd inside the target, as paths relative to its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelImages {
    pub kernel: String,
    pub initrd: String,
}

/// Locate the kernel and initrd under `<root>/boot`.
///
/// Prefers the `vmlinuz`/`initrd.img` symlinks, else the highest versioned
/// `vmlinuz-*` with its matching `initrd.img-*`.
pub fn find_kernel_images(root: &Path) -> Result<KernelImages> {
    let boot = root.join("boot");
    if boot.join("vmlinuz").exists() && boot.join("initrd.img").exists() {
        return Ok(KernelImages {
            kernel: "/boot/vmlinuz".to_string(),
            initrd: "/boot/initrd.img".to_string(),
        });
    }

    let mut versions: Vec<String> = std::fs::read_dir(&boot)
        .map_err(|e| InstallerError::bootloader(format!("cannot read {}: {}", boot.display(), e)))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("vmlinuz-"))
                .map(str::to_string)
        })
        .filter(|version| boot.join(format!("initrd.img-{}", version)).exists())
        .collect();
    versions.sort_by_key(|version| version_key(version));

    let version = versions
        .pop()
        .ok_or_else(|| InstallerError::bootloader(format!("no kernel with initrd in {}", boot.display())))?;
    Ok(KernelImages {
        kernel: format!("/boot/vmlinuz-{}", version),
        initrd: format!("/boot/initrd.img-{}", version),
    })
}

/// Numeric components of a kernel version, so `6.11` sorts after `6.8`.
fn version_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// Write `<root>/etc/default/grub` if the image did not ship one.
pub fn ensure_default_grub(root: &Path) -> Result<bool> {
    let path = root.join(DEFAULT_GRUB);
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, DEFAULT_GRUB_CONTENTS)?;
    info!(path = %path.display(), "created default GRUB settings");
    Ok(true)
}

/// True when `contents` is large enough and has at least one menu entry.
pub fn is_valid_grub_cfg(contents: &str) -> bool {
    contents.len() >= MIN_GRUB_CFG_BYTES
        && contents.lines().any(|line| line.trim_start().starts_with("menuentry"))
}

/// Minimal `grub.cfg` booting `images` from the root filesystem `root_uuid`.
pub fn synthesize_grub_cfg(root_uuid: &str, images: &KernelImages, firmware: FirmwareMode) -> String {
    let table = match firmware {
        FirmwareMode::Uefi => "part_gpt",
        FirmwareMode::Bios => "part_msdos",
    };
    let entry = |title: &str, options: &str| {
        format!(
            "menuentry \"{title}\" {{\n    search --no-floppy --fs-uuid --set=root {uuid}\n    linux {kernel} root=UUID={uuid} ro {options}\n    initrd {initrd}\n}}\n",
            title = title,
            uuid = root_uuid,
            kernel = images.kernel,
            initrd = images.initrd,
            options = options,
        )
    };

    let mut cfg = format!(
        "# GRUB configuration - {id}\nset timeout=5\nset default=0\n\ninsmod {table}\ninsmod ext2\ninsmod fat\ninsmod search_fs_uuid\n\n",
        id = BOOTLOADER_ID,
        table = table
    );
    cfg.push_str(&entry(BOOTLOADER_ID, KERNEL_CMDLINE));
    cfg.push('\n');
    cfg.push_str(&entry(&format!("{} (recovery mode)", BOOTLOADER_ID), "single"));
    if firmware.is_uefi() {
        cfg.push_str("\nmenuentry \"UEFI Firmware Settings\" {\n    fwsetup\n}\n");
    }
    cfg
}

/// Boot numbers (`0003`) of `efibootmgr` entries whose label is `label`.
pub fn parse_efibootmgr_entries(output: &str, label: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Boot")?;
            let (number, description) = rest.split_once(|c: char| c == '*' || c.is_whitespace())?;
            if number.len() != 4 || !number.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            let name = description.trim_start_matches('*').trim();
            let name = name.split('\t').next().unwrap_or(name).trim();
            (name == label || name.starts_with(&format!("{} ", label))).then(|| number.to_string())
        })
        .collect()
}

fn root_uuid(runner: &mut dyn CommandRunner, device: &str) -> Result<String> {
    let uuid = runner.run("blkid", &["-s", "UUID", "-o", "value", device])?;
    if uuid.is_empty() {
        return Err(InstallerError::bootloader(format!("root partition {} has no UUID", device)));
    }
    Ok(uuid)
}

/// Regenerate `grub.cfg` and replace it by hand when it is unusable.
fn finalize_grub_cfg(
    runner: &mut dyn CommandRunner,
    root: &Path,
    firmware: FirmwareMode,
    targets: &BootTargets,
    images: &KernelImages,
) -> Result<()> {
    if chroot(runner, root, &["update-grub"]).is_err() {
        warn!("update-grub failed, validating whatever it left behind");
    }

    let path = root.join(GRUB_CFG);
    let current = std::fs::read_to_string(&path).unwrap_or_default();
    if is_valid_grub_cfg(&current) {
        info!(path = %path.display(), "grub.cfg has boot entries");
        return Ok(());
    }

    warn!(path = %path.display(), "grub.cfg missing or without boot entries, writing one by hand");
    let uuid = root_uuid(runner, &targets.root_device)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, synthesize_grub_cfg(&uuid, images, firmware))?;
    Ok(())
}

/// Replace stale NVRAM entries with one pointing at `loader`, made default.
fn register_efi_entry(
    runner: &mut dyn CommandRunner,
    disk: &str,
    number: u32,
    loader: &str,
    unicode: Option<&str>,
) -> Result<()> {
    let listing = runner.run("efibootmgr", &[]).unwrap_or_default();
    for stale in parse_efibootmgr_entries(&listing, BOOTLOADER_ID) {
        runner.run_lenient("efibootmgr", &["-b", &stale, "-B"]);
    }

    let part = number.to_string();
    let mut args: Vec<&str> = vec![
        "--create",
        "--disk",
        disk,
        "--part",
        part.as_str(),
        "--label",
        BOOTLOADER_ID,
        "--loader",
        loader,
    ];
    if let Some(options) = unicode {
        args.extend(["--unicode", options]);
    }
    let created = runner.run("efibootmgr", &args)?;

    if let Some(new) = parse_efibootmgr_entries(&created, BOOTLOADER_ID).first() {
        runner.run_lenient("efibootmgr", &["-o", new]);
    }
    Ok(())
}

/// Install GRUB for `firmware` into the target at `root`.
pub fn install_grub(
    runner: &mut dyn CommandRunner,
    root: &Path,
    firmware: FirmwareMode,
    targets: &BootTargets,
    images: &KernelImages,
) -> Result<()> {
    ensure_default_grub(root)?;

    match firmware {
        FirmwareMode::Uefi => {
            let (_, number) = targets
                .efi
                .as_ref()
                .ok_or_else(|| InstallerError::bootloader("EFI partition not resolved"))?;

            apt_install(runner, root, UEFI_PACKAGES)?;
            let bootloader_id = format!("--bootloader-id={}", BOOTLOADER_ID);
            chroot(
                runner,
                root,
                &[
                    "grub-install",
                    "--target=x86_64-efi",
                    "--efi-directory=/boot/efi",
                    bootloader_id.as_str(),
                    "--recheck",
                ],
            )?;
            finalize_grub_cfg(runner, root, firmware, targets, images)?;

            let binary = efi_dir(root).join("grubx64.efi");
            if !binary.exists() {
                return Err(InstallerError::bootloader(format!("{} was not created", binary.display())));
            }

            let loader = format!("\\EFI\\{}\\grubx64.efi", BOOTLOADER_ID);
            register_efi_entry(runner, &targets.disk, *number, &loader, None)?;
        }
        FirmwareMode::Bios => {
            apt_install(runner, root, BIOS_PACKAGES)?;
            chroot(runner, root, &["grub-install", "--target=i386-pc", "--recheck", &targets.disk])?;
            finalize_grub_cfg(runner, root, firmware, targets, images)?;
        }
    }

    info!(%firmware, disk = %targets.disk, "GRUB installed");
    Ok(())
}

fn efi_dir(root: &Path) -> PathBuf {
    root.join("boot/efi/EFI").join(BOOTLOADER_ID)
}

/// Copy the kernel and initrd onto the ESP and boot them directly.
///
/// Both files are checked after copying. A missing one is an error and no
/// NVRAM entry is created.
pub fn install_direct_boot(
    runner: &mut dyn CommandRunner,
    root: &Path,
    targets: &BootTargets,
    images: &KernelImages,
) -> Result<()> {
    let (_, number) = targets
        .efi
        .as_ref()
        .ok_or_else(|| InstallerError::bootloader("direct boot needs an EFI partition"))?;

    let dest = efi_dir(root);
    let dest_arg = dest.display().to_string();
    runner.run("mkdir", &["-p", &dest_arg])?;

    let copies = [
        (&images.kernel, "vmlinuz"),
        (&images.initrd, "initrd.img"),
    ];
    for (source, name) in copies {
        let from = root.join(source.trim_start_matches('/')).display().to_string();
        let to = dest.join(name).display().to_string();
        runner.run("cp", &[&from, &to])?;
    }
    for (_, name) in copies {
        if !dest.join(name).exists() {
            return Err(InstallerError::bootloader(format!(
                "{} missing from the ESP after copy",
                dest.join(name).display()
            )));
        }
    }

    let uuid = root_uuid(runner, &targets.root_device)?;
    let options = format!(
        "root=UUID={} ro quiet splash initrd=\\EFI\\{}\\initrd.img",
        uuid, BOOTLOADER_ID
    );
    let loader = format!("\\EFI\\{}\\vmlinuz", BOOTLOADER_ID);
    register_efi_entry(runner, &targets.disk, *number, &loader, Some(&options))?;

    warn!(
        disk = %targets.disk,
        "DEGRADED BOOT: GRUB is not installed, firmware boots the kernel directly"
    );
    Ok(())
}

/// Install the boot stack, falling back to direct kernel boot under UEFI.
pub fn install_bootloader(
    runner: &mut dyn CommandRunner,
    root: &Path,
    firmware: FirmwareMode,
    mounts: &[MountEntry],
) -> Result<BootOutcome> {
    let targets = resolve_targets(mounts, firmware)?;
    let images = find_kernel_images(root)?;
    info!(kernel = %images.kernel, initrd = %images.initrd, "found kernel");

    match install_grub(runner, root, firmware, &targets, &images) {
        Ok(()) => Ok(BootOutcome::Grub),
        Err(e) if firmware.is_uefi() => {
            error!("GRUB installation failed: {}", e);
            install_direct_boot(runner, root, &targets, &images).map_err(|fallback| {
                InstallerError::bootloader(format!(
                    "GRUB failed ({}) and direct boot fallback failed ({})",
                    e, fallback
                ))
            })?;
            Ok(BootOutcome::DirectKernel)
        }
        Err(e) => Err(e),
    }
}
