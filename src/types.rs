//! Type-safe value types shared by the disk model, editor and compiler
//!
//! Stringly-typed values from the JSON plan are parsed into these enums at the
//! boundary so the rest of the installer can match exhaustively.

use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// Filesystem kind of a partition.
///
/// `Efi` and `Bios` are role kinds: they are never written to disk as-is but
/// normalize to a concrete filesystem plus a fixed mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileSystemKind {
    Ext4,
    Ext3,
    Ext2,
    Fat32,
    Vfat,
    Ntfs,
    Swap,
    Efi,
    Bios,
}

impl FileSystemKind {
    /// Resolve role kinds to the concrete filesystem they are formatted with.
    pub fn normalize(self) -> (FileSystemKind, Option<&'static str>) {
        match self {
            Self::Efi => (Self::Fat32, Some("/boot/efi")),
            Self::Bios => (Self::Ext4, Some("/boot")),
            other => (other, None),
        }
    }

    /// Mount point forced by a role kind, if any.
    pub fn forced_mount_point(self) -> Option<&'static str> {
        self.normalize().1
    }

    /// True when choosing this kind must be followed by a mount point choice.
    pub fn wants_mount_point(self) -> bool {
        matches!(self, Self::Ext4 | Self::Ext3 | Self::Ext2)
    }

    /// True for FAT variants, which mount as `vfat`.
    pub fn is_fat(self) -> bool {
        matches!(self.normalize().0, Self::Fat32 | Self::Vfat)
    }

    /// Filesystem type string used by mount(8) and fstab.
    pub fn mount_type(self) -> &'static str {
        match self.normalize().0 {
            Self::Fat32 | Self::Vfat => "vfat",
            Self::Ext3 => "ext3",
            Self::Ext2 => "ext2",
            Self::Ntfs => "ntfs",
            Self::Swap => "swap",
            _ => "ext4",
        }
    }

    /// Filesystem type hint parted accepts for `mkpart` on msdos labels.
    pub fn parted_hint(self) -> &'static str {
        match self.normalize().0 {
            Self::Fat32 | Self::Vfat => "fat32",
            Self::Ntfs => "ntfs",
            Self::Swap => "linux-swap",
            Self::Ext3 => "ext3",
            Self::Ext2 => "ext2",
            _ => "ext4",
        }
    }

    /// Shell command that formats `device` with this kind.
    pub fn format_command(self, device: &str) -> String {
        match self.normalize().0 {
            Self::Fat32 | Self::Vfat => format!("mkfs.vfat -F32 {}", device),
            Self::Ext4 => format!("mkfs.ext4 -F {}", device),
            Self::Ext3 => format!("mkfs.ext3 -F {}", device),
            Self::Ext2 => format!("mkfs.ext2 -F {}", device),
            Self::Ntfs => format!("mkfs.ntfs -f {}", device),
            Self::Swap => format!("mkswap {}", device),
            // normalize() never yields a role kind
            Self::Efi | Self::Bios => format!("mkfs.vfat -F32 {}", device),
        }
    }

    /// Map an lsblk/blkid `FSTYPE` to a kind. Unknown types yield `None`.
    pub fn from_probe(fstype: &str) -> Option<Self> {
        match fstype.trim().to_lowercase().as_str() {
            "vfat" | "fat" | "fat32" | "msdos" => Some(Self::Fat32),
            "" => None,
            other => Self::from_str(other)
                .ok()
                .filter(|kind| !matches!(kind, Self::Efi | Self::Bios)),
        }
    }
}

/// Deserialize an optional filesystem kind, mapping unknown names to `None`.
pub fn lenient_filesystem<'de, D>(deserializer: D) -> Result<Option<FileSystemKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|name| FileSystemKind::from_str(name.trim()).ok()))
}

/// Partition table label written when a disk is relabelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TableKind {
    Gpt,
    Msdos,
}

/// Desktop environment installed after the base image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DesktopEnvironment {
    #[default]
    Gnome,
    Kde,
    Xfce,
    Cinnamon,
    Headless,
}

impl DesktopEnvironment {
    /// Apt packages that provide this desktop.
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Self::Gnome => &["ubuntu-desktop-minimal"],
            Self::Kde => &["kde-plasma-desktop"],
            Self::Xfce => &["xubuntu-desktop-minimal"],
            Self::Cinnamon => &["cinnamon-desktop-environment"],
            Self::Headless => &[],
        }
    }
}
