//! Layout compiler scenarios
//!
//! Whole plans go through `compile_plan` and the rendered disk.sh is checked
//! line by line, the way the installer will run it.

use alinix::disk::layout::whole_disk_layout;
use alinix::disk::model::{Disk, Partition, PartitionSize};
use alinix::disk::size::GIB;
use alinix::engine::storage::{compile_disk, compile_plan, StorageOp};
use alinix::{FileSystemKind, FirmwareMode, InstallerError};
use std::path::Path;

fn existing(uuid: &str, name: &str, gib: u64, fs: FileSystemKind, mount: Option<&str>) -> Partition {
    Partition {
        uuid: Some(uuid.to_string()),
        name: Some(name.to_string()),
        size: PartitionSize::Bytes(gib * GIB),
        filesystem: Some(fs),
        probed_filesystem: Some(fs),
        mount_point: mount.map(str::to_string),
        erase: false,
        used: true,
    }
}

fn script_lines(script: &str) -> Vec<&str> {
    script.lines().collect()
}

fn position(lines: &[&str], needle: &str) -> usize {
    lines
        .iter()
        .position(|line| line.contains(needle))
        .unwrap_or_else(|| panic!("no line containing {:?} in:\n{}", needle, lines.join("\n")))
}

// =============================================================================
// Whole-disk layouts
// =============================================================================

#[test]
fn test_uefi_whole_disk_script() {
    let disk = whole_disk_layout(&Disk::new("nvme0n1", 64 * GIB), FirmwareMode::Uefi, None).unwrap();
    let plan = compile_plan(&[disk], FirmwareMode::Uefi).unwrap();
    let script = plan.render_script(Path::new("/mnt/alinix-temp"));
    let lines = script_lines(&script);

    assert_eq!(lines[0], "#!/bin/bash");
    assert_eq!(lines[1], "set -e");
    assert!(lines.contains(&"parted -s /dev/nvme0n1 mklabel gpt"));
    assert!(lines.contains(&"parted -s /dev/nvme0n1 mkpart primary 1MiB 1025MiB"));
    assert!(lines.contains(&"parted -s /dev/nvme0n1 mkpart primary 1025MiB 100%"));
    assert!(lines.contains(&"mkfs.vfat -F32 /dev/nvme0n1p1"));
    assert!(lines.contains(&"mkfs.ext4 -F /dev/nvme0n1p2"));
    assert!(lines.contains(&"parted -s /dev/nvme0n1 set 1 esp on"));
    assert!(lines.contains(&"parted -s /dev/nvme0n1 set 1 boot on"));

    // Label before partitions, device wait before format
    assert!(position(&lines, "mklabel") < position(&lines, "mkpart"));
    assert!(position(&lines, "[ -b /dev/nvme0n1p2 ] && break") < position(&lines, "mkfs.ext4"));

    // Root is mounted before the ESP that lives inside it
    let root = position(&lines, "mount /dev/nvme0n1p2 /mnt/alinix-temp");
    let esp = position(&lines, "mount -t vfat /dev/nvme0n1p1 /mnt/alinix-temp/boot/efi");
    assert!(root < esp);
    assert!(lines.contains(&"blkid -o value -s TYPE /dev/nvme0n1p1 | grep -q vfat || mkfs.vfat -F32 /dev/nvme0n1p1"));
}

#[test]
fn test_bios_whole_disk_with_home() {
    let disk = whole_disk_layout(&Disk::new("/dev/sda", 100 * GIB), FirmwareMode::Bios, Some(40.0)).unwrap();
    let plan = compile_plan(&[disk], FirmwareMode::Bios).unwrap();
    let lines = plan.disks[0].shell_lines();

    assert!(lines.contains(&"parted -s /dev/sda mklabel msdos".to_string()));
    assert!(lines.contains(&"parted -s /dev/sda mkpart primary ext4 1MiB 40961MiB".to_string()));
    assert!(lines.contains(&"parted -s /dev/sda mkpart primary ext4 40961MiB 100%".to_string()));
    assert!(!lines.iter().any(|l| l.contains(" set ")), "no boot partition under BIOS");

    let mounts = plan.mounts();
    assert_eq!(mounts[0].mount_point, "/");
    assert_eq!(mounts[0].device, "/dev/sda2");
    assert_eq!(mounts[1].mount_point, "/home");
    assert!(mounts.iter().all(|m| m.uuid.is_none()));
}

// =============================================================================
// Keeping an existing table
// =============================================================================

#[test]
fn test_existing_partitions_are_reformatted_or_kept() {
    let mut disk = Disk::new("/dev/sda", 100 * GIB);
    disk.partitions = vec![
        existing("ABCD-1234", "/dev/sda1", 1, FileSystemKind::Fat32, Some("/boot/efi")),
        existing("0f1e-77", "/dev/sda2", 60, FileSystemKind::Ext4, Some("/")),
        existing("9999-aa", "/dev/sda3", 39, FileSystemKind::Ext4, Some("/srv")),
    ];
    disk.partitions[1].erase = true;

    let plan = compile_plan(&[disk], FirmwareMode::Uefi).unwrap();
    let lines = plan.disks[0].shell_lines();

    assert!(!plan.disks[0].relabel);
    assert!(!lines.iter().any(|l| l.contains("mklabel") || l.contains("mkpart")));
    assert!(lines.contains(&"parted -s /dev/sda print || true".to_string()));
    assert!(lines.contains(&"umount $(blkid -U 0f1e-77 2>/dev/null || echo /dev/sda2) 2>/dev/null || true".to_string()));
    assert!(lines.contains(&"mkfs.ext4 -F $(blkid -U 0f1e-77 2>/dev/null || echo /dev/sda2)".to_string()));
    assert!(!lines.iter().any(|l| l.contains("mkfs.vfat")), "the kept ESP is not formatted");
    assert!(!lines.iter().any(|l| l.contains("sda3") && l.contains("mkfs")));

    // Kept partitions mount by UUID, the reformatted one by path
    let mounts = plan.mounts();
    let srv = mounts.iter().find(|m| m.mount_point == "/srv").unwrap();
    assert_eq!(srv.uuid.as_deref(), Some("9999-aa"));
    let root = mounts.iter().find(|m| m.mount_point == "/").unwrap();
    assert_eq!(root.uuid, None);

    let script = plan.render_script(Path::new("/target"));
    assert!(script.contains("mount UUID=9999-aa /target/srv || mount /dev/sda3 /target/srv || echo"));
}

#[test]
fn test_wipe_flag_recreates_existing_partitions() {
    let mut disk = Disk::new("/dev/sdb", 50 * GIB);
    disk.wipe = true;
    disk.partitions = vec![existing("u-1", "/dev/sdb1", 50, FileSystemKind::Ext4, Some("/"))];
    disk.partitions[0].size = PartitionSize::Remaining;
    disk.partitions[0].erase = true;

    let plan = compile_plan(&[disk], FirmwareMode::Bios).unwrap();
    let lines = plan.disks[0].shell_lines();
    assert!(plan.disks[0].relabel);
    assert_eq!(lines.iter().filter(|l| l.contains("mkpart")).count(), 1);
    assert!(lines.contains(&"umount /dev/sdb?* 2>/dev/null || true".to_string()));
    assert!(plan.is_destructive());
}

// =============================================================================
// Errors and warnings
// =============================================================================

#[test]
fn test_second_sentinel_names_the_partition() {
    let mut disk = Disk::new("/dev/sda", 20 * GIB);
    disk.partitions = vec![
        Partition::planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/".into())),
        Partition::planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/home".into())),
    ];

    match compile_disk(&disk, FirmwareMode::Bios) {
        Err(InstallerError::Compile { partition, .. }) => assert_eq!(partition, "/dev/sda2"),
        other => panic!("expected a compile error, got {:?}", other),
    }
    assert!(matches!(
        compile_plan(&[disk], FirmwareMode::Bios),
        Err(InstallerError::Validation(_))
    ));
}

#[test]
fn test_unparsable_size_is_a_compile_error() {
    let mut disk = Disk::new("/dev/sda", 20 * GIB);
    disk.partitions = vec![Partition::planned(
        PartitionSize::Text("lots".into()),
        FileSystemKind::Ext4,
        Some("/".into()),
    )];

    let err = compile_disk(&disk, FirmwareMode::Uefi).unwrap_err();
    assert!(err.to_string().contains("/dev/sda1"), "{}", err);
}

#[test]
fn test_partition_after_sentinel_is_skipped_with_warning() {
    let mut disk = Disk::new("/dev/sda", 20 * GIB);
    disk.partitions = vec![
        Partition::planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/".into())),
        Partition::planned(PartitionSize::Bytes(2 * GIB), FileSystemKind::Swap, None),
    ];

    let plan = compile_disk(&disk, FirmwareMode::Bios).unwrap();
    assert_eq!(plan.warnings.len(), 1);
    assert!(plan.warnings[0].contains("/dev/sda2"));
    let creates = plan
        .ops
        .iter()
        .filter(|op| matches!(op, StorageOp::CreatePartition { .. }))
        .count();
    assert_eq!(creates, 1);
    assert!(!plan.shell_lines().iter().any(|l| l.contains("mkswap")));
}

#[test]
fn test_swap_is_enabled_after_mkswap() {
    let mut disk = Disk::new("/dev/vda", 20 * GIB);
    disk.partitions = vec![
        Partition::planned(PartitionSize::Text("2GB".into()), FileSystemKind::Swap, None),
        Partition::planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/".into())),
    ];

    let plan = compile_plan(&[disk], FirmwareMode::Bios).unwrap();
    let lines = plan.disks[0].shell_lines();
    let mkswap = lines.iter().position(|l| l == "mkswap /dev/vda1").unwrap();
    let swapon = lines.iter().position(|l| l == "swapon /dev/vda1").unwrap();
    assert!(mkswap < swapon);
    assert!(lines.contains(&"parted -s /dev/vda mkpart primary linux-swap 1MiB 2049MiB".to_string()));
    assert!(plan.mounts().iter().all(|m| m.filesystem != FileSystemKind::Swap));
}
