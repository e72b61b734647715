//! Property-based tests for the disk model and layout compiler
//!
//! These tests verify:
//! - Partition naming round-trips through index and parent disk
//! - Size strings parse to the advertised binary units
//! - Compiled plans are deterministic and partition ranges never overlap
//! - A second remaining-space partition always fails to compile
//! - Mounts are ordered parents first

use alinix::disk::model::{Disk, Partition, PartitionSize};
use alinix::disk::naming::{partition_device, partition_index, whole_disk_device};
use alinix::disk::size::{parse_size, SizeSpec, GIB, MIB};
use alinix::engine::mount::{mount_depth, order_mounts, MountEntry};
use alinix::engine::storage::{compile_disk, PartitionEnd, StorageOp};
use alinix::{FileSystemKind, FirmwareMode, InstallerError};
use proptest::prelude::*;
use std::collections::HashSet;

// =============================================================================
// Strategies
// =============================================================================

fn disk_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "sd[a-z]".prop_map(|s| format!("/dev/{}", s)),
        "vd[a-z]".prop_map(|s| format!("/dev/{}", s)),
        (0u8..4, 1u8..4).prop_map(|(c, n)| format!("/dev/nvme{}n{}", c, n)),
        (0u8..3).prop_map(|n| format!("/dev/mmcblk{}", n)),
    ]
}

fn firmware_strategy() -> impl Strategy<Value = FirmwareMode> {
    prop_oneof![Just(FirmwareMode::Uefi), Just(FirmwareMode::Bios)]
}

fn filesystem_strategy() -> impl Strategy<Value = FileSystemKind> {
    prop_oneof![
        Just(FileSystemKind::Ext4),
        Just(FileSystemKind::Ext3),
        Just(FileSystemKind::Ext2),
        Just(FileSystemKind::Ntfs),
        Just(FileSystemKind::Swap),
    ]
}

/// A disk holding only planned partitions with explicit sizes in GiB.
fn planned_disk(name: &str, sizes: &[(u64, FileSystemKind)]) -> Disk {
    let total: u64 = sizes.iter().map(|(gib, _)| gib).sum();
    let mut disk = Disk::new(name, (total + 1) * GIB);
    disk.partitions = sizes
        .iter()
        .map(|(gib, fs)| Partition::planned(PartitionSize::Bytes(gib * GIB), *fs, None))
        .collect();
    disk.renumber();
    disk
}

fn mount_point_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,6}", 0..4).prop_map(|parts| format!("/{}", parts.join("/")))
}

// =============================================================================
// Naming
// =============================================================================

proptest! {
    /// The n-th partition names its index and its parent disk
    #[test]
    fn partition_naming_roundtrip(disk in disk_name_strategy(), index in 1usize..64) {
        let device = partition_device(&disk, index);
        prop_assert_eq!(partition_index(&device), Some(index as u32));
        prop_assert_eq!(whole_disk_device(&device), disk);
    }

    /// Renumbering gives unique names in increasing order
    #[test]
    fn renumbered_names_are_unique(
        disk in disk_name_strategy(),
        count in 1usize..12,
    ) {
        let sizes: Vec<(u64, FileSystemKind)> = (0..count).map(|_| (1, FileSystemKind::Ext4)).collect();
        let disk = planned_disk(&disk, &sizes);
        let names: Vec<String> = disk.partitions.iter().filter_map(|p| p.name.clone()).collect();
        let unique: HashSet<&String> = names.iter().collect();
        prop_assert_eq!(unique.len(), count);
        let indices: Vec<u32> = names.iter().filter_map(|n| partition_index(n)).collect();
        prop_assert!(indices.windows(2).all(|w| w[0] + 1 == w[1]));
    }
}

// =============================================================================
// Size parsing
// =============================================================================

proptest! {
    #[test]
    fn gigabytes_are_binary(n in 1u64..4096, unit in prop_oneof![Just("GB"), Just("GiB"), Just("gb"), Just("G")]) {
        prop_assert_eq!(parse_size(&format!("{}{}", n, unit)), Ok(SizeSpec::Bytes(n * GIB)));
    }

    #[test]
    fn bare_numbers_are_mebibytes(n in 1u64..1_000_000) {
        prop_assert_eq!(parse_size(&n.to_string()), Ok(SizeSpec::Bytes(n * MIB)));
    }

    #[test]
    fn any_percentage_is_remaining(p in 1u32..=100) {
        prop_assert_eq!(parse_size(&format!("{}%", p)), Ok(SizeSpec::Remaining));
    }

    /// Garbage never panics
    #[test]
    fn parse_size_is_total(input in ".{0,16}") {
        let _ = parse_size(&input);
    }
}

// =============================================================================
// Layout compiler
// =============================================================================

proptest! {
    #[test]
    fn compile_is_deterministic(
        disk in disk_name_strategy(),
        firmware in firmware_strategy(),
        sizes in prop::collection::vec((1u64..64, filesystem_strategy()), 1..6),
    ) {
        let disk = planned_disk(&disk, &sizes);
        let first = compile_disk(&disk, firmware).unwrap();
        let second = compile_disk(&disk, firmware).unwrap();
        prop_assert_eq!(first.shell_lines(), second.shell_lines());
        prop_assert_eq!(first.ops, second.ops);
    }

    /// New partitions are laid out back to back from 1 MiB
    #[test]
    fn created_ranges_are_contiguous(
        disk in disk_name_strategy(),
        firmware in firmware_strategy(),
        sizes in prop::collection::vec((1u64..64, filesystem_strategy()), 1..6),
    ) {
        let disk = planned_disk(&disk, &sizes);
        let plan = compile_disk(&disk, firmware).unwrap();
        let ranges: Vec<(u64, PartitionEnd)> = plan
            .ops
            .iter()
            .filter_map(|op| match op {
                StorageOp::CreatePartition { start_mib, end, .. } => Some((*start_mib, *end)),
                _ => None,
            })
            .collect();

        prop_assert_eq!(ranges.len(), sizes.len());
        prop_assert_eq!(ranges[0].0, 1);
        let mut expected_start = 1;
        for ((start, end), (gib, _)) in ranges.iter().zip(&sizes) {
            prop_assert_eq!(*start, expected_start);
            prop_assert_eq!(*end, PartitionEnd::Mib(start + gib * 1024));
            expected_start = start + gib * 1024;
        }
    }

    #[test]
    fn second_remaining_partition_fails(
        disk in disk_name_strategy(),
        firmware in firmware_strategy(),
        before in 0usize..3,
    ) {
        let mut disk = Disk::new(&disk, 100 * GIB);
        for _ in 0..before {
            disk.partitions.push(Partition::planned(PartitionSize::Bytes(GIB), FileSystemKind::Ext4, None));
        }
        disk.partitions.push(Partition::planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/".into())));
        disk.partitions.push(Partition::planned(PartitionSize::Text("100%".into()), FileSystemKind::Ext4, None));
        disk.renumber();

        match compile_disk(&disk, firmware) {
            Err(InstallerError::Compile { partition, .. }) => {
                prop_assert_eq!(partition, partition_device(&disk.name, before + 2));
            }
            other => prop_assert!(false, "expected a compile error, got {:?}", other),
        }
    }
}

// =============================================================================
// Mount ordering
// =============================================================================

proptest! {
    /// Every mount point comes after all of its ancestors
    #[test]
    fn mounts_are_ordered_parents_first(points in prop::collection::vec(mount_point_strategy(), 1..10)) {
        let entries: Vec<MountEntry> = points
            .iter()
            .enumerate()
            .map(|(i, point)| MountEntry {
                device: format!("/dev/sda{}", i + 1),
                uuid: None,
                mount_point: point.clone(),
                filesystem: FileSystemKind::Ext4,
            })
            .collect();

        let ordered = order_mounts(&entries);
        prop_assert_eq!(ordered.len(), entries.len());
        prop_assert!(ordered
            .windows(2)
            .all(|w| mount_depth(&w[0].mount_point) <= mount_depth(&w[1].mount_point)));

        for (i, child) in ordered.iter().enumerate() {
            for parent in &ordered[i + 1..] {
                let prefix = format!("{}/", parent.mount_point.trim_end_matches('/'));
                prop_assert!(
                    parent.mount_point == child.mount_point || !child.mount_point.starts_with(&prefix),
                    "{} mounted before its parent {}",
                    child.mount_point,
                    parent.mount_point
                );
            }
        }
    }
}
