//! Filesystem and mount point choosers.

use super::prompt::{choose, MenuOption, Prompter};
use crate::disk::validate::is_valid_mount_point;
use crate::error::Result;
use crate::hardware::FirmwareMode;
use crate::types::FileSystemKind;

const OTHER: &str = "other";

/// Kinds offered for a partition. The firmware role kind matches the machine.
pub fn filesystem_options(firmware: FirmwareMode) -> Vec<MenuOption<FileSystemKind>> {
    let role = match firmware {
        FirmwareMode::Uefi => MenuOption::new("efi   (EFI system partition, /boot/efi)", FileSystemKind::Efi),
        FirmwareMode::Bios => MenuOption::new("bios  (boot partition, /boot)", FileSystemKind::Bios),
    };
    vec![
        MenuOption::new("ext4", FileSystemKind::Ext4),
        MenuOption::new("ext3", FileSystemKind::Ext3),
        MenuOption::new("ext2", FileSystemKind::Ext2),
        MenuOption::new("fat32", FileSystemKind::Fat32),
        MenuOption::new("ntfs", FileSystemKind::Ntfs),
        MenuOption::new("swap", FileSystemKind::Swap),
        role,
    ]
}

pub fn select_filesystem(prompter: &mut dyn Prompter, firmware: FirmwareMode) -> Result<FileSystemKind> {
    choose(prompter, "Filesystem type", &filesystem_options(firmware))
}

pub fn mount_options() -> Vec<MenuOption<String>> {
    ["/", "/home", "/boot", "/var", "/tmp", OTHER]
        .iter()
        .map(|m| MenuOption::new(*m, m.to_string()))
        .collect()
}

/// Pick a mount point; "other" asks for an absolute path.
pub fn select_mount_point(prompter: &mut dyn Prompter) -> Result<String> {
    let choice = choose(prompter, "Mount point", &mount_options())?;
    if choice != OTHER {
        return Ok(choice);
    }
    prompter.text("Mount point (e.g. /mnt/data)", &|input: &str| {
        if is_valid_mount_point(input.trim()) {
            Ok(())
        } else {
            Err("enter an absolute path such as /srv".to_string())
        }
    })
    .map(|m| m.trim().to_string())
}
