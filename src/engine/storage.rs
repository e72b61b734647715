//! Partition layout compiler.
//!
//! Translates accepted disk layouts into an ordered sequence of atomic
//! [`StorageOp`]s per disk and renders them as the `disk.sh` shell script.
//!
//! # Per-partition rules
//!
//! | Partition                        | Operations generated |
//! |----------------------------------|----------------------|
//! | existing, kept, no filesystem    | none (skipped) |
//! | existing, kept                   | none, offset untouched |
//! | existing, erase                  | Unmount → Format |
//! | planned                          | Create → Rescan → Settle → Wait → Format (→ Flags) |
//!
//! Compilation is pure: no I/O, the same layout always yields the same
//! script.

use super::mount::{mount_script_lines, order_mounts, MountEntry};
use crate::disk::model::{Disk, Partition};
use crate::disk::naming::{dev_path, partition_device, partition_index};
use crate::disk::size::{bytes_to_mib, SizeSpec};
use crate::disk::validate::ensure_valid;
use crate::error::{InstallerError, Result};
use crate::hardware::FirmwareMode;
use crate::process::CommandRunner;
use crate::types::{FileSystemKind, TableKind};
use std::fmt;
use std::path::Path;
use strum::Display;
use tracing::{info, warn};

/// How many one-second polls to wait for a new partition node.
pub const DEVICE_WAIT_ATTEMPTS: u32 = 10;

/// Exit status `disk.sh` uses when a partition node never shows up.
pub const DEVICE_TIMEOUT_EXIT: i32 = 3;

const DEVICE_TIMEOUT_MARKER: &str = "device-timeout:";

// ============================================================================
// Storage Operation Types
// ============================================================================

/// How a partition is addressed from the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    Path(String),
    /// Resolved through `blkid -U` at run time, falling back to the path.
    Uuid { uuid: String, fallback: String },
}

impl DeviceRef {
    pub fn shell(&self) -> String {
        match self {
            Self::Path(path) => path.clone(),
            Self::Uuid { uuid, fallback } => {
                format!("$(blkid -U {} 2>/dev/null || echo {})", uuid, fallback)
            }
        }
    }

    pub fn device(&self) -> &str {
        match self {
            Self::Path(path) => path,
            Self::Uuid { fallback, .. } => fallback,
        }
    }
}

/// End of a `mkpart` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionEnd {
    Mib(u64),
    Remaining,
}

impl fmt::Display for PartitionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mib(end) => write!(f, "{}MiB", end),
            Self::Remaining => write!(f, "100%"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionFlag {
    Esp,
    Boot,
}

/// A single atomic storage operation in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Comment line in the script
    Note(String),

    /// Unmount anything on the disk before relabelling
    ReleaseDisk { disk: String },

    /// Write a fresh, empty partition table
    WriteLabel { disk: String, table: TableKind },

    /// Print the partition table (tolerates failure)
    ShowTable { disk: String },

    /// Unmount a partition that is about to be reformatted
    Unmount { target: DeviceRef },

    CreatePartition {
        disk: String,
        /// Filesystem hint, only emitted for msdos labels
        hint: Option<&'static str>,
        start_mib: u64,
        end: PartitionEnd,
    },

    /// Ask the kernel to re-read the partition table
    Rescan { disk: String },

    /// Wait for udev to finish creating device nodes
    Settle,

    /// Poll for a device node, failing the script if it never appears
    WaitForDevice { device: String, attempts: u32 },

    Format { target: DeviceRef, filesystem: FileSystemKind },

    EnableSwap { target: DeviceRef },

    SetFlag { disk: String, number: usize, flag: PartitionFlag },
}

impl StorageOp {
    /// Shell lines for this operation.
    pub fn shell_lines(&self) -> Vec<String> {
        match self {
            Self::Note(text) => vec![format!("# {}", text)],
            Self::ReleaseDisk { disk } => vec![format!("umount {}?* 2>/dev/null || true", disk)],
            Self::WriteLabel { disk, table } => vec![format!("parted -s {} mklabel {}", disk, table)],
            Self::ShowTable { disk } => vec![format!("parted -s {} print || true", disk)],
            Self::Unmount { target } => {
                vec![format!("umount {} 2>/dev/null || true", target.shell())]
            }
            Self::CreatePartition { disk, hint, start_mib, end } => {
                let hint = hint.map(|h| format!(" {}", h)).unwrap_or_default();
                vec![format!("parted -s {} mkpart primary{} {}MiB {}", disk, hint, start_mib, end)]
            }
            Self::Rescan { disk } => vec![format!("partprobe {}", disk)],
            Self::Settle => vec!["udevadm settle --timeout=10".to_string()],
            Self::WaitForDevice { device, attempts } => vec![
                format!(
                    "for i in $(seq 1 {}); do [ -b {} ] && break; sleep 1; done",
                    attempts, device
                ),
                format!(
                    "[ -b {dev} ] || {{ echo \"{marker} {dev}\" >&2; exit {code}; }}",
                    dev = device,
                    marker = DEVICE_TIMEOUT_MARKER,
                    code = DEVICE_TIMEOUT_EXIT
                ),
            ],
            Self::Format { target, filesystem } => vec![filesystem.format_command(&target.shell())],
            Self::EnableSwap { target } => vec![format!("swapon {}", target.shell())],
            Self::SetFlag { disk, number, flag } => {
                vec![format!("parted -s {} set {} {} on", disk, number, flag)]
            }
        }
    }
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note(text) => write!(f, "Note({})", text),
            Self::ReleaseDisk { disk } => write!(f, "ReleaseDisk({})", disk),
            Self::WriteLabel { disk, table } => write!(f, "WriteLabel({}, {})", disk, table),
            Self::ShowTable { disk } => write!(f, "ShowTable({})", disk),
            Self::Unmount { target } => write!(f, "Unmount({})", target.device()),
            Self::CreatePartition { disk, start_mib, end, .. } => {
                write!(f, "CreatePartition({}, {}MiB..{})", disk, start_mib, end)
            }
            Self::Rescan { disk } => write!(f, "Rescan({})", disk),
            Self::Settle => write!(f, "Settle"),
            Self::WaitForDevice { device, attempts } => {
                write!(f, "WaitForDevice({}, {} attempts)", device, attempts)
            }
            Self::Format { target, filesystem } => {
                write!(f, "Format({}, fs={})", target.device(), filesystem)
            }
            Self::EnableSwap { target } => write!(f, "EnableSwap({})", target.device()),
            Self::SetFlag { disk, number, flag } => {
                write!(f, "SetFlag({} #{}, {})", disk, number, flag)
            }
        }
    }
}

/// Compiled operations for one disk.
#[derive(Debug, Clone)]
pub struct StoragePlan {
    pub disk: String,
    pub table: TableKind,
    /// Whether the partition table is rewritten
    pub relabel: bool,
    pub ops: Vec<StorageOp>,
    /// Filesystems to mount once the operations ran
    pub mounts: Vec<MountEntry>,
    /// Non-fatal problems found while compiling
    pub warnings: Vec<String>,
}

impl StoragePlan {
    /// Returns true if this plan destroys data.
    pub fn is_destructive(&self) -> bool {
        self.ops.iter().any(|op| {
            matches!(
                op,
                StorageOp::WriteLabel { .. } | StorageOp::CreatePartition { .. } | StorageOp::Format { .. }
            )
        })
    }

    pub fn shell_lines(&self) -> Vec<String> {
        self.ops.iter().flat_map(StorageOp::shell_lines).collect()
    }

    /// Returns a summary of the plan for logging/display.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Storage Plan: {}", self.disk),
            format!("  Table: {} ({})", self.table, if self.relabel { "new" } else { "kept" }),
            format!("  Operations ({}):", self.ops.len()),
        ];
        for (i, op) in self.ops.iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, op));
        }
        for warning in &self.warnings {
            lines.push(format!("  Warning: {}", warning));
        }
        lines.join("\n")
    }
}

/// Compiled operations for every disk in an accepted plan.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub disks: Vec<StoragePlan>,
}

impl CompiledPlan {
    /// Every mount across all disks, parents first.
    pub fn mounts(&self) -> Vec<MountEntry> {
        let all: Vec<MountEntry> = self.disks.iter().flat_map(|d| d.mounts.clone()).collect();
        order_mounts(&all)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.disks.iter().flat_map(|d| d.warnings.clone()).collect()
    }

    pub fn is_destructive(&self) -> bool {
        self.disks.iter().any(StoragePlan::is_destructive)
    }

    /// Render `disk.sh`: partitioning for every disk, then the mount section.
    pub fn render_script(&self, root: &Path) -> String {
        let mut lines = vec![
            "#!/bin/bash".to_string(),
            "set -e".to_string(),
            String::new(),
        ];
        for plan in &self.disks {
            lines.extend(plan.shell_lines());
            lines.push(String::new());
        }
        lines.extend(mount_script_lines(&self.mounts(), root));
        lines.push(String::new());
        lines.join("\n")
    }

    pub fn summary(&self) -> String {
        self.disks.iter().map(StoragePlan::summary).collect::<Vec<_>>().join("\n")
    }
}

// ============================================================================
// Plan Calculation
// ============================================================================

/// Validate and compile every disk of a plan.
pub fn compile_plan(disks: &[Disk], firmware: FirmwareMode) -> Result<CompiledPlan> {
    ensure_valid(disks)?;
    let plans = disks
        .iter()
        .map(|disk| compile_disk(disk, firmware))
        .collect::<Result<Vec<_>>>()?;
    Ok(CompiledPlan { disks: plans })
}

/// Compile one disk's layout.
///
/// # Errors
///
/// `InstallerError::Compile` naming the partition when:
/// - two live partitions claim the remaining space
/// - a partition to be created or formatted has no filesystem kind
/// - a size string cannot be parsed or is below 1 MiB
pub fn compile_disk(disk: &Disk, firmware: FirmwareMode) -> Result<StoragePlan> {
    let disk_path = dev_path(&disk.name);
    let table = if firmware.is_uefi() { TableKind::Gpt } else { TableKind::Msdos };
    let relabel = disk.needs_relabel();
    let live: Vec<&Partition> = disk.live().collect();

    if let Some(second) = live.iter().filter(|p| p.size.is_remaining()).nth(1) {
        return Err(InstallerError::compile(
            device_label(second, &disk_path, &live),
            "another partition on this disk already takes the remaining space",
        ));
    }

    let mut ops = Vec::new();
    let mut mounts = Vec::new();
    let mut warnings = Vec::new();

    ops.push(StorageOp::Note(format!("Disk {}", disk_path)));
    if relabel {
        ops.push(StorageOp::ReleaseDisk { disk: disk_path.clone() });
        ops.push(StorageOp::WriteLabel { disk: disk_path.clone(), table });
    } else {
        ops.push(StorageOp::Note(format!("Keeping existing partition table on {}", disk_path)));
        ops.push(StorageOp::ShowTable { disk: disk_path.clone() });
    }

    let mut start_mib: u64 = 1;
    let mut exhausted = false;

    for (position, partition) in live.iter().enumerate() {
        let number = position + 1;
        let device = partition
            .name
            .as_deref()
            .map(dev_path)
            .unwrap_or_else(|| partition_device(&disk_path, number));

        if partition.is_existing() && !relabel {
            if !partition.erase {
                if partition.filesystem.is_none() {
                    ops.push(StorageOp::Note(format!("Skipping {} (no filesystem)", device)));
                    continue;
                }
                ops.push(StorageOp::Note(format!("Keeping {}", device)));
                push_mount(&mut mounts, partition, &device, partition.uuid.clone());
                continue;
            }

            let filesystem = partition
                .filesystem
                .ok_or_else(|| InstallerError::compile(&device, "marked for erase but has no filesystem"))?;
            let target = DeviceRef::Uuid {
                uuid: partition.uuid.clone().unwrap_or_default(),
                fallback: device.clone(),
            };
            ops.push(StorageOp::Note(format!("Reformatting {} as {}", device, filesystem)));
            ops.push(StorageOp::Unmount { target: target.clone() });
            ops.push(StorageOp::Format { target, filesystem });
            push_mount(&mut mounts, partition, &device, None);
            continue;
        }

        if exhausted {
            let warning = format!(
                "no space left for {}: an earlier partition takes the remaining space",
                device
            );
            warn!("{}", warning);
            ops.push(StorageOp::Note(format!("Skipped {}: disk space exhausted", device)));
            warnings.push(warning);
            continue;
        }

        let filesystem = partition
            .filesystem
            .ok_or_else(|| InstallerError::compile(&device, "no filesystem kind to create it with"))?;

        let end = match partition.size.spec() {
            Ok(SizeSpec::Bytes(bytes)) => {
                let mib = bytes_to_mib(bytes);
                if mib == 0 {
                    return Err(InstallerError::compile(&device, "size is below 1 MiB"));
                }
                PartitionEnd::Mib(start_mib + mib)
            }
            Ok(SizeSpec::Remaining) => {
                exhausted = true;
                PartitionEnd::Remaining
            }
            Err(e) => return Err(InstallerError::compile(&device, e.to_string())),
        };

        let hint = match table {
            TableKind::Msdos => Some(filesystem.parted_hint()),
            TableKind::Gpt => None,
        };

        ops.push(StorageOp::Note(format!("Creating {} ({})", device, filesystem)));
        ops.push(StorageOp::CreatePartition {
            disk: disk_path.clone(),
            hint,
            start_mib,
            end,
        });
        if let PartitionEnd::Mib(next) = end {
            start_mib = next;
        }
        ops.push(StorageOp::Rescan { disk: disk_path.clone() });
        ops.push(StorageOp::Settle);
        ops.push(StorageOp::WaitForDevice {
            device: device.clone(),
            attempts: DEVICE_WAIT_ATTEMPTS,
        });

        let target = DeviceRef::Path(device.clone());
        ops.push(StorageOp::Format { target: target.clone(), filesystem });
        if filesystem == FileSystemKind::Swap {
            ops.push(StorageOp::EnableSwap { target });
        }

        // parted numbers by slot, which on a kept table is not the live position
        let number = partition_index(&device).map_or(number, |n| n as usize);
        match partition.effective_mount_point().as_deref() {
            Some("/boot/efi") => {
                ops.push(StorageOp::SetFlag { disk: disk_path.clone(), number, flag: PartitionFlag::Esp });
                ops.push(StorageOp::SetFlag { disk: disk_path.clone(), number, flag: PartitionFlag::Boot });
            }
            Some("/boot") => {
                ops.push(StorageOp::SetFlag { disk: disk_path.clone(), number, flag: PartitionFlag::Boot });
            }
            _ => {}
        }

        push_mount(&mut mounts, partition, &device, None);
    }

    ops.push(StorageOp::Rescan { disk: disk_path.clone() });
    ops.push(StorageOp::Settle);
    ops.push(StorageOp::ShowTable { disk: disk_path.clone() });

    let plan = StoragePlan {
        disk: disk_path,
        table,
        relabel,
        ops,
        mounts,
        warnings,
    };
    info!(disk = %plan.disk, ops = plan.ops.len(), relabel, "compiled storage plan");
    Ok(plan)
}

fn device_label(partition: &Partition, disk: &str, live: &[&Partition]) -> String {
    partition.name.as_deref().map(dev_path).unwrap_or_else(|| {
        let position = live.iter().position(|p| std::ptr::eq(*p, partition)).unwrap_or(0);
        partition_device(disk, position + 1)
    })
}

fn push_mount(mounts: &mut Vec<MountEntry>, partition: &Partition, device: &str, uuid: Option<String>) {
    let Some(filesystem) = partition.effective_filesystem() else {
        return;
    };
    if filesystem == FileSystemKind::Swap {
        return;
    }
    if let Some(mount_point) = partition.effective_mount_point() {
        mounts.push(MountEntry {
            device: device.to_string(),
            uuid,
            mount_point,
            filesystem,
        });
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Write the script and mark it executable.
pub fn write_disk_script(path: &Path, contents: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

/// Run `disk.sh`, mapping the device-timeout exit to its own error.
pub fn run_disk_script(runner: &mut dyn CommandRunner, path: &Path) -> Result<()> {
    let script = path.display().to_string();
    runner
        .run("bash", &[&script])
        .map(|_| ())
        .map_err(classify_script_failure)
}

/// Turn an `Exec` failure of `disk.sh` into `DeviceTimeout` when the script
/// gave up waiting for a partition node.
pub fn classify_script_failure(err: InstallerError) -> InstallerError {
    match err {
        InstallerError::Exec { code: Some(DEVICE_TIMEOUT_EXIT), ref stderr, .. } => {
            match stderr
                .lines()
                .find_map(|line| line.trim().strip_prefix(DEVICE_TIMEOUT_MARKER))
            {
                Some(device) => InstallerError::DeviceTimeout {
                    device: device.trim().to_string(),
                    attempts: DEVICE_WAIT_ATTEMPTS,
                },
                None => err,
            }
        }
        other => other,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::model::PartitionSize;
    use crate::disk::size::GIB;
    use crate::editor::ops;

    fn planned(size: PartitionSize, fs: FileSystemKind, mount: Option<&str>) -> Partition {
        Partition::planned(size, fs, mount.map(str::to_string))
    }

    fn existing(uuid: &str, name: &str, fs: Option<FileSystemKind>) -> Partition {
        Partition {
            uuid: Some(uuid.to_string()),
            name: Some(name.to_string()),
            size: PartitionSize::Bytes(10 * GIB),
            filesystem: fs,
            probed_filesystem: fs,
            mount_point: None,
            erase: false,
            used: true,
        }
    }

    fn uefi_disk() -> Disk {
        let mut disk = Disk::new("/dev/sda", 20 * GIB);
        disk.partitions = vec![
            planned(PartitionSize::Bytes(GIB), FileSystemKind::Efi, None),
            planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/")),
        ];
        disk.renumber();
        disk
    }

    #[test]
    fn test_uefi_plan_relabels_gpt() {
        let plan = compile_disk(&uefi_disk(), FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input

        assert!(plan.relabel);
        assert_eq!(plan.table, TableKind::Gpt);
        assert!(plan.ops.iter().any(|op| matches!(
            op,
            StorageOp::WriteLabel { table: TableKind::Gpt, .. }
        )));
        assert!(plan.is_destructive());
    }

    #[test]
    fn test_mkpart_offsets() {
        let plan = compile_disk(&uefi_disk(), FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input
        let creates: Vec<_> = plan
            .ops
            .iter()
            .filter_map(|op| match op {
                StorageOp::CreatePartition { start_mib, end, hint, .. } => Some((*start_mib, *end, *hint)),
                _ => None,
            })
            .collect();
        assert_eq!(
            creates,
            vec![(1, PartitionEnd::Mib(1025), None), (1025, PartitionEnd::Remaining, None)]
        );
    }

    #[test]
    fn test_esp_flags_on_efi_partition() {
        let plan = compile_disk(&uefi_disk(), FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input
        let lines = plan.shell_lines();
        assert!(lines.contains(&"parted -s /dev/sda set 1 esp on".to_string()));
        assert!(lines.contains(&"parted -s /dev/sda set 1 boot on".to_string()));
        assert!(lines.contains(&"mkfs.vfat -F32 /dev/sda1".to_string()));
        assert!(lines.contains(&"mkfs.ext4 -F /dev/sda2".to_string()));
    }

    #[test]
    fn test_wait_precedes_format() {
        let plan = compile_disk(&uefi_disk(), FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input
        let wait = plan.ops.iter().position(|op| matches!(
            op,
            StorageOp::WaitForDevice { device, .. } if device == "/dev/sda2"
        ));
        let format = plan.ops.iter().position(|op| matches!(
            op,
            StorageOp::Format { target: DeviceRef::Path(d), .. } if d == "/dev/sda2"
        ));
        assert!(wait.is_some() && format.is_some());
        assert!(wait < format);
    }

    #[test]
    fn test_msdos_hint_for_bios() {
        let mut disk = Disk::new("/dev/vda", 20 * GIB);
        disk.partitions = vec![
            planned(PartitionSize::Bytes(2 * GIB), FileSystemKind::Swap, None),
            planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/")),
        ];
        disk.renumber();
        let plan = compile_disk(&disk, FirmwareMode::Bios).expect("plan generation failed"); // test: known-good input
        let lines = plan.shell_lines();
        assert!(lines.contains(&"parted -s /dev/vda mklabel msdos".to_string()));
        assert!(lines.contains(&"parted -s /dev/vda mkpart primary linux-swap 1MiB 2049MiB".to_string()));
        assert!(lines.contains(&"swapon /dev/vda1".to_string()));
        assert_eq!(plan.mounts.len(), 1);
    }

    #[test]
    fn test_existing_partitions_keep_table() {
        let mut disk = Disk::new("/dev/sda", 100 * GIB);
        let mut root = existing("r-uuid", "/dev/sda2", Some(FileSystemKind::Ext4));
        root.mount_point = Some("/".to_string());
        root.erase = true;
        disk.partitions = vec![
            existing("w-uuid", "/dev/sda1", Some(FileSystemKind::Ntfs)),
            root,
            existing("x-uuid", "/dev/sda3", None),
        ];
        let plan = compile_disk(&disk, FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input

        assert!(!plan.relabel);
        assert!(!plan.ops.iter().any(|op| matches!(op, StorageOp::CreatePartition { .. })));
        assert!(!plan.ops.iter().any(|op| matches!(op, StorageOp::WriteLabel { .. })));
        assert!(plan
            .shell_lines()
            .contains(&"mkfs.ext4 -F $(blkid -U r-uuid 2>/dev/null || echo /dev/sda2)".to_string()));
        // reformatted partitions get a new UUID, so mount by device
        assert_eq!(plan.mounts[0].uuid, None);
    }

    #[test]
    fn test_kept_partition_mounts_by_uuid() {
        let mut disk = Disk::new("/dev/sda", 100 * GIB);
        let mut home = existing("h-uuid", "/dev/sda1", Some(FileSystemKind::Ext4));
        home.mount_point = Some("/home".to_string());
        disk.partitions = vec![home];
        let plan = compile_disk(&disk, FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input

        assert!(!plan.is_destructive());
        assert_eq!(plan.mounts[0].uuid.as_deref(), Some("h-uuid"));
    }

    #[test]
    fn test_reformat_after_delete_keeps_device() {
        let mut disk = Disk::new("/dev/sda", 100 * GIB);
        disk.partitions = vec![
            existing("old-uuid", "/dev/sda1", Some(FileSystemKind::Ntfs)),
            existing("root-uuid", "/dev/sda2", Some(FileSystemKind::Ext4)),
        ];
        ops::delete(&mut disk, 0);
        let root = ops::resolve(&disk, "root-uuid").expect("still live"); // test: only sda1 was deleted
        ops::set_mount_point(&mut disk, root, Some("/".to_string())).expect("valid mount point"); // test: root is allowed
        ops::erase(&mut disk, root);
        // a new ESP goes into the first slot parted has not handed out
        ops::create(&mut disk, 1.0, FileSystemKind::Efi).expect("fits"); // test: within free space

        let plan = compile_disk(&disk, FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input
        assert!(!plan.relabel);
        let lines = plan.shell_lines();
        assert!(lines.contains(&"mkfs.ext4 -F $(blkid -U root-uuid 2>/dev/null || echo /dev/sda2)".to_string()));
        let root_mount = plan.mounts.iter().find(|m| m.mount_point == "/").expect("root mounted"); // test: root was set
        assert_eq!(root_mount.device, "/dev/sda2");
        assert!(lines.contains(&"parted -s /dev/sda set 3 esp on".to_string()));
        assert!(plan.mounts.iter().any(|m| m.device == "/dev/sda3" && m.mount_point == "/boot/efi"));
    }

    #[test]
    fn test_two_remaining_partitions_fail() {
        let mut disk = Disk::new("/dev/sda", 20 * GIB);
        disk.partitions = vec![
            planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/")),
            planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/home")),
        ];
        disk.renumber();
        let err = compile_disk(&disk, FirmwareMode::Uefi).expect_err("must fail"); // test: expected error
        assert!(matches!(err, InstallerError::Compile { ref partition, .. } if partition == "/dev/sda2"));
    }

    #[test]
    fn test_partition_after_remaining_is_warning() {
        let mut disk = Disk::new("/dev/sda", 20 * GIB);
        disk.partitions = vec![
            planned(PartitionSize::Remaining, FileSystemKind::Ext4, Some("/")),
            planned(PartitionSize::Bytes(GIB), FileSystemKind::Swap, None),
        ];
        disk.renumber();
        let plan = compile_disk(&disk, FirmwareMode::Uefi).expect("warning, not error"); // test: known-good input
        assert_eq!(plan.warnings.len(), 1);
        assert!(!plan.shell_lines().iter().any(|l| l.contains("mkswap")));
    }

    #[test]
    fn test_bad_size_names_partition() {
        let mut disk = Disk::new("/dev/sda", 20 * GIB);
        disk.partitions = vec![planned(PartitionSize::Text("lots".into()), FileSystemKind::Ext4, Some("/"))];
        disk.renumber();
        let err = compile_disk(&disk, FirmwareMode::Uefi).expect_err("must fail"); // test: expected error
        assert!(err.to_string().contains("/dev/sda1"));
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn test_text_sizes_are_parsed() {
        let mut disk = Disk::new("/dev/sda", 100 * GIB);
        disk.partitions = vec![
            planned(PartitionSize::Text("512MB".into()), FileSystemKind::Efi, None),
            planned(PartitionSize::Text("20GB".into()), FileSystemKind::Ext4, Some("/")),
        ];
        disk.renumber();
        let plan = compile_disk(&disk, FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input
        assert!(plan.shell_lines().contains(&"parted -s /dev/sda mkpart primary 513MiB 20993MiB".to_string()));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = compile_plan(&[uefi_disk()], FirmwareMode::Uefi).expect("plan"); // test: known-good input
        let b = compile_plan(&[uefi_disk()], FirmwareMode::Uefi).expect("plan"); // test: known-good input
        let root = Path::new("/mnt/alinix-temp");
        assert_eq!(a.render_script(root), b.render_script(root));
    }

    #[test]
    fn test_compile_plan_rejects_invalid_layout() {
        let mut disk = uefi_disk();
        disk.partitions[1].mount_point = None;
        assert!(matches!(
            compile_plan(&[disk], FirmwareMode::Uefi),
            Err(InstallerError::Validation(_))
        ));
    }

    #[test]
    fn test_render_script_layout() {
        let plan = compile_plan(&[uefi_disk()], FirmwareMode::Uefi).expect("plan"); // test: known-good input
        let script = plan.render_script(Path::new("/mnt/alinix-temp"));
        assert!(script.starts_with("#!/bin/bash\nset -e\n"));
        assert!(script.contains("for i in $(seq 1 10); do [ -b /dev/sda1 ] && break; sleep 1; done"));
        let label = script.find("mklabel gpt").expect("label"); // test: asserted present
        let mount = script.find("mount /dev/sda2 /mnt/alinix-temp/").expect("mount"); // test: asserted present
        assert!(label < mount);
    }

    #[test]
    fn test_classify_device_timeout() {
        let err = InstallerError::Exec {
            command: "bash".into(),
            args: vec!["disk.sh".into()],
            code: Some(DEVICE_TIMEOUT_EXIT),
            stderr: "device-timeout: /dev/sda2".into(),
        };
        assert!(matches!(
            classify_script_failure(err),
            InstallerError::DeviceTimeout { ref device, attempts: 10 } if device == "/dev/sda2"
        ));

        let other = InstallerError::Exec {
            command: "bash".into(),
            args: vec![],
            code: Some(1),
            stderr: String::new(),
        };
        assert!(matches!(classify_script_failure(other), InstallerError::Exec { .. }));
    }

    #[test]
    fn test_write_disk_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir"); // test: known-good input
        let path = dir.path().join("nested/disk.sh");
        write_disk_script(&path, "#!/bin/bash\n").expect("write"); // test: writable tempdir
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode(); // test: file just written
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_summary_lists_ops() {
        let plan = compile_disk(&uefi_disk(), FirmwareMode::Uefi).expect("plan generation failed"); // test: known-good input
        let summary = plan.summary();
        assert!(summary.contains("Storage Plan: /dev/sda"));
        assert!(summary.contains("WriteLabel(/dev/sda, gpt)"));
    }
}
