//! Whole-disk layout: replace everything on one disk with a fixed boot, an
//! optional home and a root partition taking the rest.

use super::model::{Disk, Partition, PartitionSize};
use super::size::{bytes_to_gib, gib_to_bytes, GIB};
use crate::error::{InstallerError, Result};
use crate::hardware::FirmwareMode;
use crate::types::FileSystemKind;

/// Size of the EFI system partition on UEFI machines.
pub const EFI_PARTITION_BYTES: u64 = GIB;

/// Space kept back for root when a separate home partition is requested.
pub const ROOT_RESERVE_BYTES: u64 = 2 * GIB;

/// Smallest home partition offered.
pub const MIN_HOME_GIB: f64 = 1.0;

fn boot_bytes(firmware: FirmwareMode) -> u64 {
    match firmware {
        FirmwareMode::Uefi => EFI_PARTITION_BYTES,
        FirmwareMode::Bios => 0,
    }
}

/// Largest home partition (GiB) that still leaves room for root.
pub fn max_home_gib(disk_bytes: u64, firmware: FirmwareMode) -> f64 {
    let available = disk_bytes
        .saturating_sub(boot_bytes(firmware))
        .saturating_sub(ROOT_RESERVE_BYTES);
    bytes_to_gib(available)
}

/// Build a wipe-everything layout for `disk`.
///
/// UEFI gets a 1 GiB EFI partition first. With `home_gib` a separate ext4
/// `/home` of that size follows. Root takes the remaining space.
pub fn whole_disk_layout(disk: &Disk, firmware: FirmwareMode, home_gib: Option<f64>) -> Result<Disk> {
    let mut layout = Disk::new(&disk.name, disk.bytes);
    layout.wipe = true;

    if firmware.is_uefi() {
        layout.partitions.push(Partition::planned(
            PartitionSize::Bytes(EFI_PARTITION_BYTES),
            FileSystemKind::Efi,
            None,
        ));
    }

    if let Some(gib) = home_gib {
        let max = max_home_gib(disk.bytes, firmware);
        if !(MIN_HOME_GIB..=max).contains(&gib) {
            return Err(InstallerError::config(format!(
                "home size {:.2} GB is outside {:.2}..={:.2} GB for {}",
                gib, MIN_HOME_GIB, max, disk.name
            )));
        }
        layout.partitions.push(Partition::planned(
            PartitionSize::Bytes(gib_to_bytes(gib)),
            FileSystemKind::Ext4,
            Some("/home".to_string()),
        ));
    }

    layout.partitions.push(Partition::planned(
        PartitionSize::Remaining,
        FileSystemKind::Ext4,
        Some("/".to_string()),
    ));

    layout.renumber();
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::validate::validate_plan;

    #[test]
    fn test_uefi_layout_without_home() {
        let disk = Disk::new("/dev/sda", 20 * GIB);
        let layout = whole_disk_layout(&disk, FirmwareMode::Uefi, None).expect("layout"); // test: known-good input

        assert!(layout.wipe);
        assert_eq!(layout.partitions.len(), 2);
        assert_eq!(layout.partitions[0].filesystem, Some(FileSystemKind::Efi));
        assert_eq!(layout.partitions[0].name.as_deref(), Some("/dev/sda1"));
        assert_eq!(layout.partitions[1].size, PartitionSize::Remaining);
        assert_eq!(layout.partitions[1].mount_point.as_deref(), Some("/"));
        assert!(validate_plan(&[layout]).is_empty());
    }

    #[test]
    fn test_bios_layout_with_home() {
        let disk = Disk::new("/dev/vda", 40 * GIB);
        let layout = whole_disk_layout(&disk, FirmwareMode::Bios, Some(10.0)).expect("layout"); // test: known-good input

        assert_eq!(layout.partitions.len(), 2);
        assert_eq!(layout.partitions[0].mount_point.as_deref(), Some("/home"));
        assert_eq!(layout.partitions[0].size, PartitionSize::Bytes(10 * GIB));
        assert_eq!(layout.partitions[1].name.as_deref(), Some("/dev/vda2"));
    }

    #[test]
    fn test_home_bounds() {
        let disk = Disk::new("/dev/sda", 20 * GIB);
        assert_eq!(max_home_gib(disk.bytes, FirmwareMode::Uefi), 17.0);
        assert!(whole_disk_layout(&disk, FirmwareMode::Uefi, Some(17.5)).is_err());
        assert!(whole_disk_layout(&disk, FirmwareMode::Uefi, Some(0.5)).is_err());
    }

    #[test]
    fn test_tiny_disk_has_no_home_room() {
        assert_eq!(max_home_gib(2 * GIB, FirmwareMode::Uefi), 0.0);
    }
}
