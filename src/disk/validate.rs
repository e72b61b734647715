//! Plan invariants.
//!
//! Checks run before a disk layout is accepted in the editor and again before
//! anything is compiled. Every violated invariant is reported, not just the
//! first.

use super::model::Disk;
use super::size::format_gib;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingRoot,
    MultipleRoots { count: usize },
    DuplicateMountPoint { mount_point: String, partitions: Vec<String> },
    SizeOverflow { disk: String, used: u64, capacity: u64 },
    MultipleRemaining { disk: String },
    RemainingNotLast { disk: String, partition: String },
    RelativeMountPoint { partition: String, mount_point: String },
    KindChangedWithoutErase { partition: String },
    MissingFilesystem { partition: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRoot => write!(f, "no partition is mounted at /"),
            Self::MultipleRoots { count } => {
                write!(f, "{} partitions are mounted at /, exactly one is required", count)
            }
            Self::DuplicateMountPoint { mount_point, partitions } => write!(
                f,
                "mount point {} is used by more than one partition ({})",
                mount_point,
                partitions.join(", ")
            ),
            Self::SizeOverflow { disk, used, capacity } => write!(
                f,
                "partitions on {} need {} but the disk holds {}",
                disk,
                format_gib(*used),
                format_gib(*capacity)
            ),
            Self::MultipleRemaining { disk } => write!(
                f,
                "more than one partition on {} claims the remaining space",
                disk
            ),
            Self::RemainingNotLast { disk, partition } => write!(
                f,
                "{} on {} claims the remaining space but is not the last partition",
                partition, disk
            ),
            Self::RelativeMountPoint { partition, mount_point } => write!(
                f,
                "mount point '{}' of {} is not an absolute path",
                mount_point, partition
            ),
            Self::KindChangedWithoutErase { partition } => write!(
                f,
                "{} changes filesystem without being erased",
                partition
            ),
            Self::MissingFilesystem { partition } => write!(
                f,
                "{} must be formatted but has no filesystem",
                partition
            ),
        }
    }
}

/// True for an absolute POSIX path without whitespace or `..` components.
pub fn is_valid_mount_point(mount_point: &str) -> bool {
    mount_point.starts_with('/')
        && !mount_point.chars().any(char::is_whitespace)
        && !mount_point.split('/').any(|segment| segment == "..")
}

/// Per-disk invariants: sizes, remaining-space sentinel, mount point shape,
/// kind changes.
pub fn validate_disk(disk: &Disk) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let live: Vec<_> = disk.live().collect();

    let used = disk.used_bytes();
    if used > disk.bytes {
        issues.push(ValidationIssue::SizeOverflow {
            disk: disk.name.clone(),
            used,
            capacity: disk.bytes,
        });
    }

    let remaining: Vec<usize> = live
        .iter()
        .enumerate()
        .filter(|(_, p)| p.size.is_remaining())
        .map(|(i, _)| i)
        .collect();
    if remaining.len() > 1 {
        issues.push(ValidationIssue::MultipleRemaining {
            disk: disk.name.clone(),
        });
    } else if let Some(&position) = remaining.first() {
        if position + 1 != live.len() {
            issues.push(ValidationIssue::RemainingNotLast {
                disk: disk.name.clone(),
                partition: live[position].label(),
            });
        }
    }

    for partition in &live {
        if let Some(mount_point) = &partition.mount_point {
            if !is_valid_mount_point(mount_point) {
                issues.push(ValidationIssue::RelativeMountPoint {
                    partition: partition.label(),
                    mount_point: mount_point.clone(),
                });
            }
        }

        if partition.is_existing() && !partition.erase {
            if let (Some(declared), Some(probed)) = (partition.effective_filesystem(), partition.probed_filesystem) {
                if declared != probed && !(declared.is_fat() && probed.is_fat()) {
                    issues.push(ValidationIssue::KindChangedWithoutErase {
                        partition: partition.label(),
                    });
                }
            }
        }

        if partition.erase && partition.filesystem.is_none() {
            issues.push(ValidationIssue::MissingFilesystem {
                partition: partition.label(),
            });
        }
    }

    issues
}

/// Whole-plan invariants: exactly one root and unique mount points, plus every
/// per-disk check.
pub fn validate_plan(disks: &[Disk]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut by_mount: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for disk in disks {
        issues.extend(validate_disk(disk));
        for partition in disk.live() {
            if let Some(mount_point) = partition.effective_mount_point() {
                by_mount.entry(mount_point).or_default().push(partition.label());
            }
        }
    }

    match by_mount.get("/").map(Vec::len).unwrap_or(0) {
        0 => issues.insert(0, ValidationIssue::MissingRoot),
        1 => {}
        count => issues.insert(0, ValidationIssue::MultipleRoots { count }),
    }

    for (mount_point, partitions) in by_mount {
        if mount_point != "/" && partitions.len() > 1 {
            issues.push(ValidationIssue::DuplicateMountPoint {
                mount_point,
                partitions,
            });
        }
    }

    issues
}

/// Validate and convert failures into [`InstallerError::Validation`].
///
/// [`InstallerError::Validation`]: crate::error::InstallerError::Validation
pub fn ensure_valid(disks: &[Disk]) -> crate::error::Result<()> {
    let issues = validate_plan(disks);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(crate::error::InstallerError::Validation(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::model::{Partition, PartitionSize};
    use crate::disk::size::GIB;
    use crate::types::FileSystemKind;

    fn planned(gib: Option<u64>, fs: FileSystemKind, mount: Option<&str>) -> Partition {
        let size = match gib {
            Some(g) => PartitionSize::Bytes(g * GIB),
            None => PartitionSize::Remaining,
        };
        Partition::planned(size, fs, mount.map(str::to_string))
    }

    fn disk_with(parts: Vec<Partition>) -> Disk {
        let mut disk = Disk::new("/dev/sda", 20 * GIB);
        disk.partitions = parts;
        disk.renumber();
        disk
    }

    #[test]
    fn test_valid_uefi_layout() {
        let disk = disk_with(vec![
            planned(Some(1), FileSystemKind::Efi, None),
            planned(None, FileSystemKind::Ext4, Some("/")),
        ]);
        assert!(validate_plan(&[disk]).is_empty());
    }

    #[test]
    fn test_missing_root() {
        let disk = disk_with(vec![planned(Some(1), FileSystemKind::Efi, None)]);
        assert_eq!(validate_plan(&[disk]), vec![ValidationIssue::MissingRoot]);
    }

    #[test]
    fn test_two_roots_across_disks() {
        let a = disk_with(vec![planned(None, FileSystemKind::Ext4, Some("/"))]);
        let mut b = a.clone();
        b.name = "/dev/sdb".to_string();
        let issues = validate_plan(&[a, b]);
        assert!(issues.contains(&ValidationIssue::MultipleRoots { count: 2 }));
    }

    #[test]
    fn test_duplicate_mount_point_via_role_kind() {
        let disk = disk_with(vec![
            planned(Some(1), FileSystemKind::Efi, None),
            planned(Some(1), FileSystemKind::Fat32, Some("/boot/efi")),
            planned(None, FileSystemKind::Ext4, Some("/")),
        ]);
        let issues = validate_plan(&[disk]);
        assert!(issues.iter().any(|i| matches!(
            i,
            ValidationIssue::DuplicateMountPoint { mount_point, .. } if mount_point == "/boot/efi"
        )));
    }

    #[test]
    fn test_overflow_and_remaining_rules() {
        let disk = disk_with(vec![
            planned(None, FileSystemKind::Ext4, Some("/")),
            planned(Some(25), FileSystemKind::Ext4, Some("/home")),
            planned(None, FileSystemKind::Ext4, Some("/var")),
        ]);
        let issues = validate_disk(&disk);
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::SizeOverflow { .. })));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::MultipleRemaining { .. })));
    }

    #[test]
    fn test_remaining_must_be_last() {
        let disk = disk_with(vec![
            planned(None, FileSystemKind::Ext4, Some("/")),
            planned(Some(2), FileSystemKind::Swap, None),
        ]);
        let issues = validate_disk(&disk);
        assert!(matches!(issues.as_slice(), [ValidationIssue::RemainingNotLast { .. }]));
    }

    #[test]
    fn test_dead_slots_do_not_count() {
        let mut dead = planned(Some(50), FileSystemKind::Ext4, Some("/"));
        dead.used = false;
        let disk = disk_with(vec![dead, planned(None, FileSystemKind::Ext4, Some("/"))]);
        assert!(validate_plan(&[disk]).is_empty());
    }

    #[test]
    fn test_relative_mount_point() {
        let disk = disk_with(vec![
            planned(Some(2), FileSystemKind::Ext4, Some("home")),
            planned(None, FileSystemKind::Ext4, Some("/")),
        ]);
        let issues = validate_disk(&disk);
        assert!(matches!(issues.as_slice(), [ValidationIssue::RelativeMountPoint { .. }]));
    }

    #[test]
    fn test_kind_change_requires_erase() {
        let mut part = planned(Some(5), FileSystemKind::Ntfs, Some("/data"));
        part.uuid = Some("abcd".to_string());
        part.probed_filesystem = Some(FileSystemKind::Ext4);
        part.erase = false;
        let disk = disk_with(vec![part.clone(), planned(None, FileSystemKind::Ext4, Some("/"))]);
        assert!(validate_disk(&disk)
            .iter()
            .any(|i| matches!(i, ValidationIssue::KindChangedWithoutErase { .. })));

        part.erase = true;
        let disk = disk_with(vec![part, planned(None, FileSystemKind::Ext4, Some("/"))]);
        assert!(validate_disk(&disk).is_empty());
    }

    #[test]
    fn test_mount_point_shape() {
        assert!(is_valid_mount_point("/"));
        assert!(is_valid_mount_point("/srv/data"));
        assert!(!is_valid_mount_point("srv"));
        assert!(!is_valid_mount_point("/my data"));
        assert!(!is_valid_mount_point("/../etc"));
    }

    #[test]
    fn test_ensure_valid_wraps_issues() {
        let err = ensure_valid(&[]).expect_err("empty plan has no root"); // test: expected error
        assert!(matches!(err, crate::error::InstallerError::Validation(ref v) if v.len() == 1));
    }
}
