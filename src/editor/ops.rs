//! Partition mutations behind the editor menus.
//!
//! Each operation edits one [`Disk`] in place and keeps the invariants the
//! editor relies on: kind changes imply erase, mount point changes never do,
//! sizes stay within the disk and live partitions stay numbered in order.

use crate::disk::model::{Disk, Partition, PartitionSize};
use crate::disk::naming::partition_index;
use crate::disk::size::{bytes_to_gib, format_gib, gib_to_bytes};
use crate::disk::validate::is_valid_mount_point;
use crate::types::FileSystemKind;
use thiserror::Error;
use tracing::debug;

/// Smallest partition the editor creates or resizes to, in GiB.
pub const MIN_PARTITION_GIB: f64 = 0.01;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("partition {0} not found")]
    NotFound(String),

    #[error("{requested} does not fit, at most {available} is available")]
    TooLarge { requested: String, available: String },

    #[error("size must be greater than zero")]
    ZeroSize,

    #[error("no free space left on {0}")]
    NoFreeSpace(String),

    #[error("mount point '{0}' is not an absolute path")]
    InvalidMountPoint(String),
}

/// What happens to the mount point after a filesystem kind was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountDecision {
    /// The role kind fixed it
    Forced(&'static str),
    /// The previous mount point still applies
    Keep,
    /// The caller must ask for one
    Prompt,
    /// The kind is never mounted by path
    Clear,
}

/// Index of the live partition with this UUID or device name.
pub fn resolve(disk: &Disk, key: &str) -> Result<usize, EditError> {
    disk.find(key).ok_or_else(|| EditError::NotFound(key.to_string()))
}

/// Free space in GiB, as shown in the editor.
pub fn free_gib(disk: &Disk) -> f64 {
    bytes_to_gib(disk.free_bytes())
}

/// True when there is enough unallocated space to offer a new partition.
pub fn can_create(disk: &Disk) -> bool {
    free_gib(disk) > MIN_PARTITION_GIB
}

/// Largest size (GiB) the partition at `index` may be resized to.
pub fn max_resize_gib(disk: &Disk, index: usize) -> f64 {
    bytes_to_gib(disk.headroom_for(index))
}

/// Set a new filesystem kind.
///
/// Role kinds are stored as their concrete kind with the forced mount point.
/// The partition is erased when the kind differs or it was already marked.
pub fn change_filesystem(disk: &mut Disk, index: usize, kind: FileSystemKind) -> MountDecision {
    let (filesystem, forced) = kind.normalize();
    let partition = &mut disk.partitions[index];

    let erase = partition.filesystem != Some(filesystem) || partition.erase;
    partition.filesystem = Some(filesystem);
    partition.erase = erase;

    let decision = match forced {
        Some(mount_point) => {
            partition.mount_point = Some(mount_point.to_string());
            MountDecision::Forced(mount_point)
        }
        None if filesystem.wants_mount_point() => {
            if partition.mount_point.is_some() && !erase {
                MountDecision::Keep
            } else {
                MountDecision::Prompt
            }
        }
        None => {
            partition.mount_point = None;
            MountDecision::Clear
        }
    };

    debug!(partition = %partition.label(), %filesystem, erase, ?decision, "filesystem changed");
    decision
}

/// Mark the partition's contents for destruction.
pub fn erase(disk: &mut Disk, index: usize) {
    disk.partitions[index].erase = true;
}

/// Change the mount point. Existing data is kept.
pub fn set_mount_point(disk: &mut Disk, index: usize, mount_point: Option<String>) -> Result<(), EditError> {
    if let Some(mp) = &mount_point {
        if !is_valid_mount_point(mp) {
            return Err(EditError::InvalidMountPoint(mp.clone()));
        }
    }
    disk.partitions[index].mount_point = mount_point;
    Ok(())
}

/// Resize to `gib`, bounded by the disk size minus every other live partition.
/// Resizing always erases.
pub fn resize(disk: &mut Disk, index: usize, gib: f64) -> Result<(), EditError> {
    let bytes = gib_to_bytes(gib);
    if bytes == 0 {
        return Err(EditError::ZeroSize);
    }
    let available = disk.headroom_for(index);
    if bytes > available {
        return Err(EditError::TooLarge {
            requested: format_gib(bytes),
            available: format_gib(available),
        });
    }

    let partition = &mut disk.partitions[index];
    partition.size = PartitionSize::Bytes(bytes);
    partition.erase = true;
    Ok(())
}

/// Free the slot of an existing partition without removing it from the list.
///
/// The slot loses its identity and mount point and is renamed `free-<n>`,
/// `n` being the partition number it still holds on the device. A partition
/// that was only planned has no slot and is dropped from the list.
pub fn delete(disk: &mut Disk, index: usize) {
    debug!(partition = %disk.partitions[index].label(), "partition deleted");
    if !disk.partitions[index].is_existing() {
        disk.partitions.remove(index);
        disk.renumber();
        return;
    }

    let partition = &mut disk.partitions[index];
    let number = partition
        .name
        .as_deref()
        .and_then(partition_index)
        .map_or(index + 1, |n| n as usize);
    partition.used = false;
    partition.uuid = None;
    partition.name = Some(format!("free-{}", number));
    partition.mount_point = None;
    partition.erase = true;
    disk.renumber();
}

/// Append a new partition of `gib` GiB. Returns its index and how its mount
/// point is to be chosen.
pub fn create(disk: &mut Disk, gib: f64, kind: FileSystemKind) -> Result<(usize, MountDecision), EditError> {
    if !can_create(disk) {
        return Err(EditError::NoFreeSpace(disk.name.clone()));
    }
    let bytes = gib_to_bytes(gib);
    if bytes == 0 {
        return Err(EditError::ZeroSize);
    }
    let free = disk.free_bytes();
    if bytes > free {
        return Err(EditError::TooLarge {
            requested: format_gib(bytes),
            available: format_gib(free),
        });
    }

    let (filesystem, forced) = kind.normalize();
    disk.partitions.push(Partition::planned(
        PartitionSize::Bytes(bytes),
        filesystem,
        forced.map(str::to_string),
    ));
    disk.renumber();

    let decision = match forced {
        Some(mount_point) => MountDecision::Forced(mount_point),
        None if filesystem.wants_mount_point() => MountDecision::Prompt,
        None => MountDecision::Clear,
    };
    Ok((disk.partitions.len() - 1, decision))
}
