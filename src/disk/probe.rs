//! Block device inventory from `lsblk`.

use super::model::{Disk, Partition, PartitionSize};
use super::naming::dev_path;
use crate::error::{InstallerError, Result};
use crate::process::CommandRunner;
use crate::types::FileSystemKind;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

const LSBLK_COLUMNS: &str = "NAME,SIZE,TYPE,FSTYPE,UUID,MOUNTPOINT";

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(deserialize_with = "number_or_string")]
    size: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Older util-linux prints sizes as strings even with `-b`.
fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Parse `lsblk -J -b` output into disks with their current partitions.
///
/// Only whole disks (`type == "disk"`) are returned. Existing partitions come
/// back live, not erased, with no mount point assigned.
pub fn parse_lsblk(json: &str) -> Result<Vec<Disk>> {
    let output: LsblkOutput = serde_json::from_str(json)?;

    let disks = output
        .blockdevices
        .into_iter()
        .filter(|dev| dev.kind == "disk")
        .map(|dev| {
            let mut disk = Disk::new(&dev.name, dev.size);
            disk.partitions = dev
                .children
                .into_iter()
                .filter(|child| child.kind == "part")
                .map(|child| {
                    let fs = child.fstype.as_deref().and_then(FileSystemKind::from_probe);
                    if let Some(mounted) = &child.mountpoint {
                        debug!(partition = %child.name, %mounted, "partition is mounted on the live system");
                    }
                    Partition {
                        uuid: child.uuid.filter(|u| !u.is_empty()),
                        name: Some(dev_path(&child.name)),
                        size: PartitionSize::Bytes(child.size),
                        filesystem: fs,
                        probed_filesystem: fs,
                        mount_point: None,
                        erase: false,
                        used: true,
                    }
                })
                .collect();
            disk
        })
        .collect();

    Ok(disks)
}

/// Probe the live system for disks.
pub fn list_disks(runner: &mut dyn CommandRunner) -> Result<Vec<Disk>> {
    let json = runner.run("lsblk", &["-J", "-b", "-o", LSBLK_COLUMNS])?;
    let disks = parse_lsblk(&json)?;
    if disks.is_empty() {
        return Err(InstallerError::config("no disks found"));
    }
    info!(count = disks.len(), "probed disks");
    Ok(disks)
}
