//! Bootloader installation against a recorded runner
//!
//! The target root is a temp directory holding just enough of a system
//! (kernel, initrd, grub.cfg) for the file checks to see real files.

use alinix::engine::bootloader::{install_bootloader, BootOutcome, MIN_GRUB_CFG_BYTES};
use alinix::engine::mount::MountEntry;
use alinix::{FileSystemKind, FirmwareMode, InstallerError, RecordingRunner};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const EFIBOOTMGR_LISTING: &str = "BootCurrent: 0001
BootOrder: 0003,0001
Boot0001* UEFI Shell
Boot0003* Alinix\tHD(1,GPT,...)/File(\\EFI\\Alinix\\grubx64.efi)
";

fn mounts(firmware: FirmwareMode) -> Vec<MountEntry> {
    let mut entries = vec![MountEntry {
        device: "/dev/sda2".into(),
        uuid: None,
        mount_point: "/".into(),
        filesystem: FileSystemKind::Ext4,
    }];
    if firmware.is_uefi() {
        entries.push(MountEntry {
            device: "/dev/sda1".into(),
            uuid: None,
            mount_point: "/boot/efi".into(),
            filesystem: FileSystemKind::Fat32,
        });
    }
    entries
}

/// Kernel and initrd symlink targets under `<root>/boot`.
fn target_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    let boot = dir.path().join("boot");
    fs::create_dir_all(&boot).unwrap();
    fs::write(boot.join("vmlinuz"), b"kernel").unwrap();
    fs::write(boot.join("initrd.img"), b"initrd").unwrap();
    dir
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn good_grub_cfg() -> String {
    let mut cfg = String::from("### generated by update-grub\nset default=0\n");
    cfg.push_str("menuentry 'Alinix' {\n    linux /boot/vmlinuz root=UUID=1111 ro quiet splash\n    initrd /boot/initrd.img\n}\n");
    assert!(cfg.len() >= MIN_GRUB_CFG_BYTES);
    cfg
}

// =============================================================================
// GRUB
// =============================================================================

#[test]
fn test_bios_grub_installs_to_root_disk() {
    let root = target_root();
    write(root.path(), "boot/grub/grub.cfg", &good_grub_cfg());
    let mut runner = RecordingRunner::new();

    let outcome = install_bootloader(&mut runner, root.path(), FirmwareMode::Bios, &mounts(FirmwareMode::Bios)).unwrap();
    assert_eq!(outcome, BootOutcome::Grub);

    let install = runner.position("grub-install --target=i386-pc --recheck /dev/sda").unwrap();
    let update = runner.position("update-grub").unwrap();
    assert!(runner.position("grub-pc").unwrap() < install);
    assert!(install < update);
    assert!(!runner.ran("efibootmgr"));
    assert!(root.path().join("etc/default/grub").exists());
}

#[test]
fn test_empty_grub_cfg_is_replaced() {
    let root = target_root();
    write(root.path(), "boot/grub/grub.cfg", "# empty\n");
    let mut runner = RecordingRunner::new();
    runner.respond("blkid", "1111-root");

    install_bootloader(&mut runner, root.path(), FirmwareMode::Bios, &mounts(FirmwareMode::Bios)).unwrap();

    let cfg = fs::read_to_string(root.path().join("boot/grub/grub.cfg")).unwrap();
    assert!(cfg.contains("search --no-floppy --fs-uuid --set=root 1111-root"));
    assert!(cfg.contains("recovery mode"));
    assert!(!cfg.contains("fwsetup"), "BIOS has no firmware settings entry");
}

#[test]
fn test_uefi_grub_registers_nvram_entry() {
    let root = target_root();
    write(root.path(), "boot/grub/grub.cfg", &good_grub_cfg());
    write(root.path(), "boot/efi/EFI/Alinix/grubx64.efi", "binary");
    let mut runner = RecordingRunner::new();
    runner.respond("efibootmgr", EFIBOOTMGR_LISTING);

    let outcome = install_bootloader(&mut runner, root.path(), FirmwareMode::Uefi, &mounts(FirmwareMode::Uefi)).unwrap();
    assert_eq!(outcome, BootOutcome::Grub);

    assert!(runner.ran("grub-install --target=x86_64-efi --efi-directory=/boot/efi --bootloader-id=Alinix"));
    // The stale entry goes before the new one is created
    let delete = runner.position("efibootmgr -b 0003 -B").unwrap();
    let create = runner.position("efibootmgr --create --disk /dev/sda --part 1 --label Alinix").unwrap();
    assert!(delete < create);
    assert!(runner.ran("\\EFI\\Alinix\\grubx64.efi"));
    assert!(runner.ran("efibootmgr -o 0003"));
}

#[test]
fn test_bios_grub_failure_is_fatal() {
    let root = target_root();
    let mut runner = RecordingRunner::new();
    runner.fail("grub-install", 1, "grub-install: error: cannot find a device for /boot/grub");

    let err = install_bootloader(&mut runner, root.path(), FirmwareMode::Bios, &mounts(FirmwareMode::Bios)).unwrap_err();
    assert!(matches!(err, InstallerError::Exec { .. }));
    assert!(!runner.ran("cp "));
}

// =============================================================================
// Direct kernel fallback
// =============================================================================

#[test]
fn test_uefi_grub_failure_falls_back_to_direct_boot() {
    let root = target_root();
    // cp is recorded, not executed: stage the copies it would have made
    write(root.path(), "boot/efi/EFI/Alinix/vmlinuz", "kernel");
    write(root.path(), "boot/efi/EFI/Alinix/initrd.img", "initrd");

    let mut runner = RecordingRunner::new();
    runner.fail("grub-install", 1, "grub-install: error: efibootmgr failed");
    runner.respond("blkid", "1111-root");

    let outcome = install_bootloader(&mut runner, root.path(), FirmwareMode::Uefi, &mounts(FirmwareMode::Uefi)).unwrap();
    assert_eq!(outcome, BootOutcome::DirectKernel);

    let kernel = format!("{}/boot/vmlinuz", root.path().display());
    assert!(runner.ran(&format!("cp {}", kernel)));
    let create = runner
        .command_lines()
        .into_iter()
        .find(|line| line.contains("--create"))
        .unwrap();
    assert!(create.contains("\\EFI\\Alinix\\vmlinuz"));
    assert!(create.contains("root=UUID=1111-root"));
    assert!(create.contains("initrd=\\EFI\\Alinix\\initrd.img"));
}

#[test]
fn test_direct_boot_without_copied_files_fails() {
    let root = target_root();
    let mut runner = RecordingRunner::new();
    runner.fail("grub-install", 1, "grub-install: error");
    runner.respond("blkid", "1111-root");

    let err = install_bootloader(&mut runner, root.path(), FirmwareMode::Uefi, &mounts(FirmwareMode::Uefi)).unwrap_err();
    assert!(matches!(err, InstallerError::Bootloader(_)));
    assert!(err.to_string().contains("direct boot fallback failed"));
    assert!(!runner.ran("--create"), "no NVRAM entry for a kernel that is not there");
}

#[test]
fn test_missing_kernel_fails_before_grub() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("boot")).unwrap();
    let mut runner = RecordingRunner::new();

    let err = install_bootloader(&mut runner, root.path(), FirmwareMode::Uefi, &mounts(FirmwareMode::Uefi)).unwrap_err();
    assert!(matches!(err, InstallerError::Bootloader(_)));
    assert!(runner.commands.is_empty());
}
