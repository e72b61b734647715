//! Pre-flight sanity checks for runtime environment
//!
//! Verified before anything touches a disk:
//! - Required runtime binaries are present
//! - Running with root privileges (EUID 0)
//!
//! If any check fails, the program exits with a clear error message.

use crate::process_guard::CommandProcessGroup;
use std::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }
}

/// Required runtime binaries for installation
const REQUIRED_BINARIES: &[&str] = &[
    "bash",       // disk.sh
    "parted",     // partition tables
    "partprobe",  // kernel table reload (parted)
    "udevadm",    // device settle
    "blkid",      // UUID lookup (util-linux)
    "lsblk",      // disk inventory (util-linux)
    "mkfs.ext4",  // e2fsprogs
    "mkfs.vfat",  // dosfstools
    "unsquashfs", // base image (squashfs-tools)
    "chroot",     // coreutils
];

/// Optional binaries (warn if missing but don't fail)
const OPTIONAL_BINARIES: &[&str] = &[
    "efibootmgr", // only for the UEFI direct-boot fallback
    "nmcli",      // only to join Wi-Fi before installing packages
    "genfstab",   // fstab is rebuilt from the plan without it
];

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .in_new_process_group()
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub fn verify_environment() -> SanityCheckResult {
    let missing = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(binary))
        .map(|binary| binary.to_string())
        .collect();

    for binary in OPTIONAL_BINARIES {
        if !binary_exists(binary) {
            debug!("Optional binary not found: {}", binary);
        }
    }

    SanityCheckResult {
        missing_binaries: missing,
        is_root: is_running_as_root(),
    }
}

/// Apt package providing `binary`
fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "bash" => "bash",
        "parted" | "partprobe" => "parted",
        "udevadm" => "udev",
        "blkid" | "lsblk" => "util-linux",
        "mkfs.ext4" => "e2fsprogs",
        "mkfs.vfat" => "dosfstools",
        "unsquashfs" => "squashfs-tools",
        "chroot" => "coreutils",
        "efibootmgr" => "efibootmgr",
        "nmcli" => "network-manager",
        "genfstab" => "arch-install-scripts",
        _ => "unknown",
    }
}

/// Operator-facing explanation of a failed check
pub fn failure_report(result: &SanityCheckResult) -> String {
    let mut out = String::new();
    out.push_str("\nAlinix Installer - pre-flight check failed\n\n");

    if !result.is_root {
        out.push_str("ERROR: Root privileges required\n");
        out.push_str("   Partitioning disks needs root. Run with sudo:\n");
        out.push_str("     sudo alinix-installer\n\n");
    }

    if !result.missing_binaries.is_empty() {
        out.push_str("ERROR: Missing required binaries\n");
        for binary in &result.missing_binaries {
            out.push_str(&format!("   • {} (package {})\n", binary, package_for_binary(binary)));
        }
        let mut packages: Vec<&str> = result
            .missing_binaries
            .iter()
            .map(|b| package_for_binary(b))
            .collect();
        packages.dedup();
        out.push_str(&format!("\n   Install them with:\n     apt install {}\n\n", packages.join(" ")));
    }

    out
}

/// Skip the root check during development. Set ALINIX_SKIP_ROOT_CHECK=1.
pub fn should_skip_root_check() -> bool {
    std::env::var("ALINIX_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Verify the environment and exit with status 1 if it is unusable.
pub fn run_preflight_checks(skip_root: bool) {
    debug!(skip_root, "running pre-flight sanity checks");

    let mut result = verify_environment();
    if skip_root || should_skip_root_check() {
        warn!("root check skipped");
        result.is_root = true;
    }

    if !result.is_ok() {
        eprint!("{}", failure_report(&result));
        std::process::exit(1);
    }

    info!("pre-flight checks passed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_exists_bash() {
        assert!(binary_exists("bash"), "bash should be available");
    }

    #[test]
    fn test_binary_exists_nonexistent() {
        assert!(!binary_exists("this_binary_definitely_does_not_exist_12345"));
    }

    #[test]
    fn test_package_mapping() {
        assert_eq!(package_for_binary("partprobe"), "parted");
        assert_eq!(package_for_binary("mkfs.vfat"), "dosfstools");
        assert_eq!(package_for_binary("unsquashfs"), "squashfs-tools");
    }

    #[test]
    fn test_report_lists_missing_packages() {
        let result = SanityCheckResult {
            missing_binaries: vec!["parted".to_string(), "partprobe".to_string(), "unsquashfs".to_string()],
            is_root: false,
        };
        assert!(!result.is_ok());
        let report = failure_report(&result);
        assert!(report.contains("Root privileges required"));
        assert!(report.contains("apt install parted squashfs-tools"));
    }

    #[test]
    fn test_sanity_result_is_ok() {
        let ok = SanityCheckResult {
            missing_binaries: vec![],
            is_root: true,
        };
        assert!(ok.is_ok());
        assert!(failure_report(&ok).lines().all(|l| !l.starts_with("ERROR")));
    }
}
