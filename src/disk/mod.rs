//! Disk inventory and partition planning model.
//!
//! - [`model`]: disks, partitions and sizes as the editor and compiler see them
//! - [`naming`]: device naming (`sda1`, `nvme0n1p1`)
//! - [`size`]: size strings and unit conversions
//! - [`probe`]: reading the current layout from `lsblk`
//! - [`layout`]: the wipe-entire-disk layout
//! - [`validate`]: plan invariants

pub mod layout;
pub mod model;
pub mod naming;
pub mod probe;
pub mod size;
pub mod validate;

pub use model::{Disk, Partition, PartitionId, PartitionSize};
pub use validate::{ensure_valid, validate_plan, ValidationIssue};
