//! Disk and partition model.
//!
//! A [`Disk`] is the unit of partition planning: its ordered partitions, each
//! either existing on the device (it carries a UUID) or planned (no UUID yet).
//! Deleted partitions that exist on the device stay in the list as dead
//! slots (`used == false`): the compiler never removes them, so they keep
//! holding their partition number.

use super::naming::{dev_path, partition_device, partition_index};
use super::size::{gib_to_bytes, parse_size, SizeParseError, SizeSpec};
use crate::types::{lenient_filesystem, FileSystemKind};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Declared size of a partition.
///
/// `Text` holds a size string from a JSON plan that is only parsed when the
/// plan is compiled, so a bad value is reported against its partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSize", into = "RawSize")]
pub enum PartitionSize {
    Bytes(u64),
    Remaining,
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Float(f64),
    Text(String),
}

impl From<RawSize> for PartitionSize {
    fn from(raw: RawSize) -> Self {
        match raw {
            RawSize::Bytes(bytes) => Self::Bytes(bytes),
            RawSize::Float(value) if value.is_finite() && value > 0.0 => {
                Self::Bytes(value.round() as u64)
            }
            RawSize::Float(value) => Self::Text(value.to_string()),
            RawSize::Text(text) => match parse_size(&text) {
                Ok(SizeSpec::Remaining) => Self::Remaining,
                _ => Self::Text(text),
            },
        }
    }
}

impl From<PartitionSize> for RawSize {
    fn from(size: PartitionSize) -> Self {
        match size {
            PartitionSize::Bytes(bytes) => Self::Bytes(bytes),
            PartitionSize::Remaining => Self::Text("100%".to_string()),
            PartitionSize::Text(text) => Self::Text(text),
        }
    }
}

impl PartitionSize {
    /// Resolve to a concrete spec, parsing textual sizes.
    pub fn spec(&self) -> Result<SizeSpec, SizeParseError> {
        match self {
            Self::Bytes(bytes) => Ok(SizeSpec::Bytes(*bytes)),
            Self::Remaining => Ok(SizeSpec::Remaining),
            Self::Text(text) => parse_size(text),
        }
    }

    /// Explicit byte size, or `None` for the remaining sentinel or bad text.
    pub fn explicit_bytes(&self) -> Option<u64> {
        match self.spec() {
            Ok(SizeSpec::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_remaining(&self) -> bool {
        matches!(self.spec(), Ok(SizeSpec::Remaining))
    }
}

impl fmt::Display for PartitionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "{}", super::size::format_gib(*bytes)),
            Self::Remaining => write!(f, "remaining"),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Identity of a partition: its filesystem UUID when it has one, else its
/// device name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionId {
    Uuid(String),
    Name(String),
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(uuid) | Self::Name(uuid) => write!(f, "{}", uuid),
        }
    }
}

fn default_true() -> bool {
    true
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

fn device_path<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(dev_path(raw.trim()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    #[serde(default, alias = "UUID", deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Device name (`/dev/sda1`). Absent until assigned for planned partitions.
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub size: PartitionSize,

    #[serde(default, alias = "fileSystem", deserialize_with = "lenient_filesystem")]
    pub filesystem: Option<FileSystemKind>,

    /// Filesystem found on the device by the probe.
    #[serde(default, deserialize_with = "lenient_filesystem", skip_serializing_if = "Option::is_none")]
    pub probed_filesystem: Option<FileSystemKind>,

    #[serde(default, alias = "mountPoint", deserialize_with = "empty_as_none")]
    pub mount_point: Option<String>,

    #[serde(default)]
    pub erase: bool,

    /// False for a deleted slot.
    #[serde(default = "default_true", rename = "use")]
    pub used: bool,
}

impl Partition {
    /// A new, not yet existing partition. Always flagged erase.
    pub fn planned(size: PartitionSize, filesystem: FileSystemKind, mount_point: Option<String>) -> Self {
        Self {
            uuid: None,
            name: None,
            size,
            filesystem: Some(filesystem),
            probed_filesystem: None,
            mount_point,
            erase: true,
            used: true,
        }
    }

    pub fn id(&self) -> Option<PartitionId> {
        self.uuid
            .clone()
            .map(PartitionId::Uuid)
            .or_else(|| self.name.clone().map(PartitionId::Name))
    }

    /// True when the partition already exists on the device.
    pub fn is_existing(&self) -> bool {
        self.uuid.is_some()
    }

    /// True if `key` is this partition's UUID or device name.
    pub fn matches_key(&self, key: &str) -> bool {
        self.uuid.as_deref() == Some(key) || self.name.as_deref() == Some(key)
    }

    /// Filesystem with role kinds resolved.
    pub fn effective_filesystem(&self) -> Option<FileSystemKind> {
        self.filesystem.map(|fs| fs.normalize().0)
    }

    /// Mount point including the one forced by a role kind.
    pub fn effective_mount_point(&self) -> Option<String> {
        self.filesystem
            .and_then(|fs| fs.forced_mount_point())
            .map(str::to_string)
            .or_else(|| self.mount_point.clone())
    }

    pub fn label(&self) -> String {
        self.id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(new partition)".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DiskRecord")]
pub struct Disk {
    /// Device path, e.g. `/dev/sda`.
    pub name: String,
    /// Capacity in bytes.
    pub bytes: u64,
    /// Relabel the whole disk before creating partitions.
    pub wipe: bool,
    pub partitions: Vec<Partition>,
}

/// A disk as written in JSON plans. `size` is the display size in GiB;
/// capacity comes from `bytes` and falls back to `size` only when `bytes`
/// is absent.
#[derive(Deserialize)]
struct DiskRecord {
    #[serde(deserialize_with = "device_path")]
    name: String,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    size: Option<f64>,
    #[serde(default)]
    wipe: bool,
    #[serde(default, alias = "children")]
    partitions: Vec<Partition>,
}

impl TryFrom<DiskRecord> for Disk {
    type Error = String;

    fn try_from(record: DiskRecord) -> Result<Self, Self::Error> {
        let bytes = match (record.bytes, record.size) {
            (Some(bytes), _) => bytes,
            (None, Some(gib)) => gib_to_bytes(gib),
            (None, None) => return Err(format!("disk {} has no bytes or size", record.name)),
        };
        Ok(Self {
            name: record.name,
            bytes,
            wipe: record.wipe,
            partitions: record.partitions,
        })
    }
}

impl Disk {
    pub fn new(name: &str, bytes: u64) -> Self {
        Self {
            name: dev_path(name),
            bytes,
            wipe: false,
            partitions: Vec::new(),
        }
    }

    pub fn live(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter().filter(|p| p.used)
    }

    /// Sum of explicit sizes of live partitions.
    pub fn used_bytes(&self) -> u64 {
        self.live().filter_map(|p| p.size.explicit_bytes()).sum()
    }

    pub fn has_remaining_partition(&self) -> bool {
        self.live().any(|p| p.size.is_remaining())
    }

    /// Unallocated bytes. Zero once a live partition claims the remainder.
    pub fn free_bytes(&self) -> u64 {
        if self.has_remaining_partition() {
            0
        } else {
            self.bytes.saturating_sub(self.used_bytes())
        }
    }

    /// Bytes a partition at `index` may grow to: capacity minus every other
    /// live partition's explicit size.
    pub fn headroom_for(&self, index: usize) -> u64 {
        let others: u64 = self
            .partitions
            .iter()
            .enumerate()
            .filter(|(i, p)| *i != index && p.used)
            .filter_map(|(_, p)| p.size.explicit_bytes())
            .sum();
        self.bytes.saturating_sub(others)
    }

    /// Position of the partition identified by `key` (UUID or name).
    pub fn find(&self, key: &str) -> Option<usize> {
        self.partitions.iter().position(|p| p.used && p.matches_key(key))
    }

    /// Assign device names to live partitions.
    ///
    /// A relabelled disk is named by live position. On a kept table the
    /// partitions already on the device keep their names, dead slots keep
    /// their numbers, and new partitions take the lowest free numbers, which
    /// is what parted hands out.
    pub fn renumber(&mut self) {
        let disk = self.name.clone();
        if self.needs_relabel() {
            for (position, partition) in self.partitions.iter_mut().filter(|p| p.used).enumerate() {
                partition.name = Some(partition_device(&disk, position + 1));
            }
            return;
        }

        let mut taken: HashSet<u32> = self
            .partitions
            .iter()
            .filter(|p| p.is_existing() || !p.used)
            .filter_map(|p| p.name.as_deref().and_then(partition_index))
            .collect();
        let mut next = 1;
        for partition in self.partitions.iter_mut().filter(|p| p.used && !p.is_existing()) {
            while taken.contains(&next) {
                next += 1;
            }
            taken.insert(next);
            partition.name = Some(partition_device(&disk, next as usize));
        }
    }

    /// True when nothing on the disk survives: every live partition is planned.
    pub fn needs_relabel(&self) -> bool {
        self.wipe || self.live().all(|p| !p.is_existing())
    }
}
