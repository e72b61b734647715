//! Mount orchestration for the target tree.
//!
//! Filesystems are mounted parents first (`/` before `/boot` before
//! `/boot/efi`). A failed mount is logged and skipped so one bad partition
//! does not abort the rest; later stages verify what they need.

use crate::hardware::FirmwareMode;
use crate::process::CommandRunner;
use crate::types::FileSystemKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const EFI_MOUNT_POINT: &str = "/boot/efi";

/// One filesystem to mount under the target root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    /// Filesystem UUID when it is known before formatting runs.
    pub uuid: Option<String>,
    pub mount_point: String,
    pub filesystem: FileSystemKind,
}

impl MountEntry {
    pub fn is_efi(&self) -> bool {
        self.mount_point == EFI_MOUNT_POINT
    }

    fn type_option(&self) -> &'static str {
        if self.is_efi() || self.filesystem.is_fat() {
            " -t vfat"
        } else {
            ""
        }
    }
}

/// Number of path segments: `/` is 0, `/boot` is 1, `/boot/efi` is 2.
pub fn mount_depth(mount_point: &str) -> usize {
    mount_point.split('/').filter(|s| !s.is_empty()).count()
}

/// Entries sorted by depth. Equal depths keep their input order.
pub fn order_mounts(entries: &[MountEntry]) -> Vec<MountEntry> {
    let mut ordered = entries.to_vec();
    ordered.sort_by_key(|e| mount_depth(&e.mount_point));
    ordered
}

/// Where `mount_point` lands under `root`.
pub fn target_path(root: &Path, mount_point: &str) -> PathBuf {
    root.join(mount_point.trim_start_matches('/'))
}

/// Shell lines that mount every entry under `root`, in dependency order.
pub fn mount_script_lines(entries: &[MountEntry], root: &Path) -> Vec<String> {
    let mut lines = vec!["# Mount target filesystems".to_string()];

    for entry in order_mounts(entries) {
        let target = target_path(root, &entry.mount_point).display().to_string();
        let dev = &entry.device;
        let t = entry.type_option();
        let failed = format!("echo '[!] failed to mount {} at {}'", dev, target);

        lines.push(format!("mkdir -p {}", target));
        if entry.is_efi() {
            lines.push(format!(
                "blkid -o value -s TYPE {dev} | grep -q vfat || mkfs.vfat -F32 {dev}"
            ));
        }
        match &entry.uuid {
            Some(uuid) => lines.push(format!(
                "mount{t} UUID={uuid} {target} || mount{t} {dev} {target} || {failed}"
            )),
            None => lines.push(format!("mount{t} {dev} {target} || {failed}")),
        }
    }

    lines
}

/// Outcome of [`mount_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountReport {
    pub mounted: Vec<String>,
    /// `(mount point, reason)` for each entry that could not be mounted.
    pub failed: Vec<(String, String)>,
}

impl MountReport {
    pub fn is_mounted(&self, mount_point: &str) -> bool {
        self.mounted.iter().any(|m| m == mount_point)
    }
}

/// Mount one entry, trying UUID first and the device path second.
pub fn mount_entry(runner: &mut dyn CommandRunner, entry: &MountEntry, root: &Path) -> Result<(), String> {
    let target = target_path(root, &entry.mount_point).display().to_string();
    let vfat = !entry.type_option().is_empty();

    runner
        .run("mkdir", &["-p", &target])
        .map_err(|e| e.to_string())?;

    if entry.is_efi() {
        let fstype = runner
            .run("blkid", &["-o", "value", "-s", "TYPE", &entry.device])
            .unwrap_or_default();
        if fstype != "vfat" {
            warn!(device = %entry.device, found = %fstype, "EFI partition is not FAT, formatting");
            runner
                .run("mkfs.vfat", &["-F32", &entry.device])
                .map_err(|e| e.to_string())?;
        }
    }

    let mut sources: Vec<String> = Vec::new();
    if let Some(uuid) = &entry.uuid {
        sources.push(format!("UUID={}", uuid));
    }
    sources.push(entry.device.clone());

    let mut last_error = String::new();
    for source in &sources {
        let mut args: Vec<&str> = Vec::new();
        if vfat {
            args.extend(["-t", "vfat"]);
        }
        args.extend([source.as_str(), target.as_str()]);
        match runner.run("mount", &args) {
            Ok(_) => return Ok(()),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(last_error)
}

/// Mount every entry under `root`, parents first. Failures are logged and
/// collected, never fatal.
pub fn mount_all(runner: &mut dyn CommandRunner, entries: &[MountEntry], root: &Path) -> MountReport {
    let mut report = MountReport::default();

    for entry in order_mounts(entries) {
        match mount_entry(runner, &entry, root) {
            Ok(()) => {
                info!(device = %entry.device, mount_point = %entry.mount_point, "mounted");
                report.mounted.push(entry.mount_point.clone());
            }
            Err(reason) => {
                warn!(device = %entry.device, mount_point = %entry.mount_point, "mount failed: {}", reason);
                report.failed.push((entry.mount_point.clone(), reason));
            }
        }
    }

    report
}

/// True if something is mounted at `mount_point` under `root`.
pub fn is_mounted(runner: &mut dyn CommandRunner, root: &Path, mount_point: &str) -> bool {
    let target = target_path(root, mount_point).display().to_string();
    runner.run("mountpoint", &["-q", &target]).is_ok()
}

/// Make sure the EFI system partition is mounted before the bootloader runs.
pub fn ensure_efi_mounted(runner: &mut dyn CommandRunner, entries: &[MountEntry], root: &Path) -> bool {
    if is_mounted(runner, root, EFI_MOUNT_POINT) {
        return true;
    }
    match entries.iter().find(|e| e.is_efi()) {
        Some(entry) => match mount_entry(runner, entry, root) {
            Ok(()) => true,
            Err(reason) => {
                warn!(device = %entry.device, "could not mount EFI partition: {}", reason);
                false
            }
        },
        None => false,
    }
}

/// Pseudo filesystems the chroot needs, as `(source, fstype, relative target)`.
const VIRTUAL_MOUNTS: &[(&str, Option<&str>, &str)] = &[
    ("proc", Some("proc"), "proc"),
    ("sys", Some("sysfs"), "sys"),
    ("/dev", None, "dev"),
    ("/dev/pts", None, "dev/pts"),
    ("/run", None, "run"),
];

/// Bind the live system's pseudo filesystems into the target.
pub fn bind_virtual_filesystems(runner: &mut dyn CommandRunner, root: &Path, firmware: FirmwareMode) {
    for (source, fstype, relative) in VIRTUAL_MOUNTS {
        let target = root.join(relative).display().to_string();
        if runner.run("mountpoint", &["-q", &target]).is_ok() {
            continue;
        }
        runner.run_lenient("mkdir", &["-p", &target]);
        match fstype {
            Some(fstype) => runner.run_lenient("mount", &["-t", fstype, source, &target]),
            None => runner.run_lenient("mount", &["--bind", source, &target]),
        };
    }

    if firmware.is_uefi() {
        let efivars = root.join("sys/firmware/efi/efivars").display().to_string();
        if runner.run("mountpoint", &["-q", &efivars]).is_err() {
            runner.run_lenient("mount", &["-t", "efivarfs", "efivarfs", &efivars]);
        }
    }
}

/// Recursively unmount the target tree.
pub fn unmount_all(runner: &mut dyn CommandRunner, root: &Path) -> bool {
    let target = root.display().to_string();
    runner.run_lenient("umount", &["-R", &target])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;

    fn entry(device: &str, mount_point: &str, fs: FileSystemKind) -> MountEntry {
        MountEntry {
            device: device.to_string(),
            uuid: None,
            mount_point: mount_point.to_string(),
            filesystem: fs,
        }
    }

    #[test]
    fn test_depth() {
        assert_eq!(mount_depth("/"), 0);
        assert_eq!(mount_depth("/boot"), 1);
        assert_eq!(mount_depth("/boot/efi"), 2);
        assert_eq!(mount_depth("/var/lib/"), 2);
    }

    #[test]
    fn test_order_puts_parents_first() {
        let entries = vec![
            entry("/dev/sda1", "/boot/efi", FileSystemKind::Fat32),
            entry("/dev/sda3", "/home", FileSystemKind::Ext4),
            entry("/dev/sda2", "/", FileSystemKind::Ext4),
            entry("/dev/sda4", "/boot", FileSystemKind::Ext4),
        ];
        let ordered: Vec<String> = order_mounts(&entries).into_iter().map(|e| e.mount_point).collect();
        assert_eq!(ordered, vec!["/", "/home", "/boot", "/boot/efi"]);
    }

    #[test]
    fn test_target_path() {
        let root = Path::new("/mnt/alinix-temp");
        assert_eq!(target_path(root, "/"), PathBuf::from("/mnt/alinix-temp/"));
        assert_eq!(target_path(root, "/boot/efi"), PathBuf::from("/mnt/alinix-temp/boot/efi"));
    }

    #[test]
    fn test_script_lines_guard_efi_and_prefer_uuid() {
        let mut root = entry("/dev/sda2", "/", FileSystemKind::Ext4);
        root.uuid = Some("1234-abcd".to_string());
        let efi = entry("/dev/sda1", "/boot/efi", FileSystemKind::Fat32);
        let lines = mount_script_lines(&[efi, root], Path::new("/mnt/t"));

        assert_eq!(lines[1], "mkdir -p /mnt/t/");
        assert!(lines[2].starts_with("mount UUID=1234-abcd /mnt/t/ || mount /dev/sda2 /mnt/t/"));
        assert!(lines.iter().any(|l| l == "blkid -o value -s TYPE /dev/sda1 | grep -q vfat || mkfs.vfat -F32 /dev/sda1"));
        assert!(lines.last().is_some_and(|l| l.starts_with("mount -t vfat /dev/sda1 /mnt/t/boot/efi")));
    }

    #[test]
    fn test_mount_all_continues_after_failure() {
        let mut runner = RecordingRunner::new();
        runner.fail("mount /dev/sda3", 32, "wrong fs type");
        runner.respond("blkid -o value -s TYPE /dev/sda1", "vfat");

        let entries = vec![
            entry("/dev/sda2", "/", FileSystemKind::Ext4),
            entry("/dev/sda3", "/home", FileSystemKind::Ext4),
            entry("/dev/sda1", "/boot/efi", FileSystemKind::Fat32),
        ];
        let report = mount_all(&mut runner, &entries, Path::new("/mnt/t"));

        assert!(report.is_mounted("/"));
        assert!(report.is_mounted("/boot/efi"));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "/home");
        assert!(!runner.ran("mkfs.vfat"));
    }

    #[test]
    fn test_mount_entry_falls_back_to_device() {
        let mut runner = RecordingRunner::new();
        runner.fail("mount UUID=", 32, "can't find UUID");
        let mut root = entry("/dev/sda2", "/", FileSystemKind::Ext4);
        root.uuid = Some("beef".to_string());

        assert!(mount_entry(&mut runner, &root, Path::new("/mnt/t")).is_ok());
        assert!(runner.ran("mount /dev/sda2 /mnt/t/"));
    }

    #[test]
    fn test_non_fat_efi_partition_is_formatted() {
        let mut runner = RecordingRunner::new();
        runner.respond("blkid -o value -s TYPE", "ext4");
        let efi = entry("/dev/sda1", "/boot/efi", FileSystemKind::Fat32);

        assert!(mount_entry(&mut runner, &efi, Path::new("/mnt/t")).is_ok());
        let format = runner.position("mkfs.vfat -F32 /dev/sda1").expect("formatted"); // test: asserted ordering
        let mount = runner.position("mount -t vfat").expect("mounted"); // test: asserted ordering
        assert!(format < mount);
    }

    #[test]
    fn test_bind_virtual_filesystems_uefi() {
        let mut runner = RecordingRunner::new();
        runner.fail("mountpoint -q", 1, "");
        bind_virtual_filesystems(&mut runner, Path::new("/mnt/t"), FirmwareMode::Uefi);

        assert!(runner.ran("mount -t proc proc /mnt/t/proc"));
        assert!(runner.ran("mount --bind /dev/pts /mnt/t/dev/pts"));
        assert!(runner.ran("mount -t efivarfs efivarfs /mnt/t/sys/firmware/efi/efivars"));
    }
}
