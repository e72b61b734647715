//! Target system assembly around the partitioning core.
//!
//! Base image extraction and the steps run against the provisioning root:
//! DNS, hostname, timezone, apt sources, the user account, networking and
//! packages. Everything goes through a [`CommandRunner`] or writes plain
//! files below the root.

use crate::config_file::{UserRecord, WifiCredentials};
use crate::error::{InstallerError, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::types::DesktopEnvironment;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where live media usually keep the root image, tried in order.
pub const SQUASHFS_CANDIDATES: &[&str] = &[
    "/cdrom/casper/filesystem.squashfs",
    "/mnt/cdrom/casper/filesystem.squashfs",
];

/// Ubuntu release the sources.list points at.
pub const RELEASE: &str = "questing";

/// Account of the live session, removed from the installed system.
pub const LIVE_USER: &str = "alinix";

const USER_GROUPS: &str = "sudo,adm,cdrom,audio,video";

const ALINIX_REPO: &str = "deb [arch=amd64 trusted=yes] https://jefferson-it.github.io/alinix-repo/ stable main\n";

const NETPLAN_CONFIG: &str = "# Default network configuration for the installed system
network:
  version: 2
  renderer: NetworkManager
";

/// Run `args` inside the provisioning root.
pub fn chroot(runner: &mut dyn CommandRunner, root: &Path, args: &[&str]) -> Result<String> {
    let root_arg = root.display().to_string();
    let mut full: Vec<&str> = vec![root_arg.as_str()];
    full.extend_from_slice(args);
    runner.run("chroot", &full)
}

/// Non-interactive `apt-get install` inside the provisioning root.
pub fn apt_install(runner: &mut dyn CommandRunner, root: &Path, packages: &[&str]) -> Result<String> {
    let mut args = vec!["env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "install", "-y"];
    args.extend_from_slice(packages);
    chroot(runner, root, &args)
}

// ============================================================================
// Base image
// ============================================================================

/// Locate the live root image: the known paths first, then a search of the
/// mounted media.
pub fn find_squashfs(runner: &mut dyn CommandRunner, candidates: &[&str]) -> Result<PathBuf> {
    if let Some(found) = candidates.iter().map(Path::new).find(|p| p.is_file()) {
        return Ok(found.to_path_buf());
    }

    // find exits non-zero when one of the roots is missing; its output still counts
    let spec = CommandSpec::new("find").args(["/cdrom", "/media", "-name", "filesystem.squashfs"]);
    let output = runner.execute(&spec)?;
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| InstallerError::config("filesystem.squashfs not found on the live media"))
}

/// Unpack the image into `root`, overwriting what is there.
pub fn extract_system(runner: &mut dyn CommandRunner, image: &Path, root: &Path) -> Result<()> {
    info!(image = %image.display(), root = %root.display(), "extracting base system");
    let root_arg = root.display().to_string();
    let image_arg = image.display().to_string();
    runner.run("unsquashfs", &["-f", "-d", root_arg.as_str(), image_arg.as_str()])?;
    Ok(())
}

// ============================================================================
// Plain files below the root
// ============================================================================

/// Copy the host resolver configuration so apt works inside the chroot.
///
/// The target's resolv.conf is usually a symlink into /run, which is not
/// populated yet, so it is replaced with a regular file.
pub fn copy_dns(source: &Path, root: &Path) -> Result<()> {
    let target = root.join("etc/resolv.conf");
    if target.symlink_metadata().is_ok() {
        fs::remove_file(&target)?;
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, &target)?;
    Ok(())
}

pub fn write_hostname(root: &Path, hostname: &str) -> Result<()> {
    let etc = root.join("etc");
    fs::create_dir_all(&etc)?;
    fs::write(etc.join("hostname"), format!("{}\n", hostname))?;
    fs::write(
        etc.join("hosts"),
        format!(
            "127.0.0.1\tlocalhost\n127.0.1.1\t{}\n\n::1\tip6-localhost ip6-loopback\nff02::1\tip6-allnodes\nff02::2\tip6-allrouters\n",
            hostname
        ),
    )?;
    Ok(())
}

pub fn render_sources_list(repo: &str) -> String {
    let repo = if repo.ends_with('/') { repo.to_string() } else { format!("{}/", repo) };
    let mut out = String::new();
    for suite in [RELEASE.to_string(), format!("{}-updates", RELEASE)] {
        out.push_str(&format!("deb {} {} main universe multiverse\n", repo, suite));
        out.push_str(&format!("deb-src {} {} main universe multiverse\n", repo, suite));
        out.push('\n');
    }
    let security = "http://security.ubuntu.com/ubuntu/";
    out.push_str(&format!("deb {} {}-security main universe multiverse\n", security, RELEASE));
    out.push_str(&format!("deb-src {} {}-security main universe multiverse\n", security, RELEASE));
    out
}

/// Point apt at `repo` and add the Alinix package repository.
pub fn write_sources(root: &Path, repo: &str) -> Result<()> {
    let apt = root.join("etc/apt");
    fs::create_dir_all(apt.join("sources.list.d"))?;
    fs::write(apt.join("sources.list"), render_sources_list(repo))?;
    fs::write(apt.join("sources.list.d/alinix.list"), ALINIX_REPO)?;
    info!(repo, "apt sources written");
    Ok(())
}

// ============================================================================
// Inside the chroot
// ============================================================================

pub fn set_timezone(runner: &mut dyn CommandRunner, root: &Path, timezone: &str) -> Result<()> {
    let zoneinfo = format!("/usr/share/zoneinfo/{}", timezone);
    chroot(runner, root, &["ln", "-sf", zoneinfo.as_str(), "/etc/localtime"])?;
    fs::write(root.join("etc/timezone"), format!("{}\n", timezone))?;
    info!(timezone, "timezone set");
    Ok(())
}

/// Create the login account and drop the live session user.
pub fn create_user(runner: &mut dyn CommandRunner, root: &Path, user: &UserRecord) -> Result<()> {
    chroot(
        runner,
        root,
        &["useradd", "-m", "-G", USER_GROUPS, "-s", "/bin/bash", "-c", user.name.as_str(), user.username.as_str()],
    )?;

    let spec = CommandSpec::new("chroot")
        .args([root.display().to_string(), "chpasswd".to_string()])
        .stdin(format!("{}:{}\n", user.username, user.password));
    runner.run_spec(&spec)?;

    let root_arg = root.display().to_string();
    if user.username != LIVE_USER && runner.run_lenient("chroot", &[root_arg.as_str(), "id", LIVE_USER]) {
        runner.run_lenient("chroot", &[root_arg.as_str(), "userdel", "-r", LIVE_USER]);
    }
    info!(username = %user.username, "user created");
    Ok(())
}

/// NetworkManager with a netplan renderer, so the installed system brings
/// up wired and wireless links on its own.
pub fn configure_networking(runner: &mut dyn CommandRunner, root: &Path) -> Result<()> {
    chroot(runner, root, &["env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "update"])?;
    apt_install(runner, root, &["network-manager"])?;
    chroot(runner, root, &["systemctl", "enable", "NetworkManager.service"])?;
    let netplan = root.join("etc/netplan");
    fs::create_dir_all(&netplan)?;
    fs::write(netplan.join("01-config.yaml"), NETPLAN_CONFIG)?;
    Ok(())
}

/// Desktop packages followed by the user's applications.
pub fn install_packages(
    runner: &mut dyn CommandRunner,
    root: &Path,
    desktop: Option<DesktopEnvironment>,
    apps: &[String],
) -> Result<()> {
    chroot(runner, root, &["env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "update"])?;

    if let Some(desktop) = desktop {
        let packages = desktop.packages();
        if !packages.is_empty() {
            info!(%desktop, "installing desktop");
            apt_install(runner, root, packages)?;
        }
    }

    if !apps.is_empty() {
        let apps: Vec<&str> = apps.iter().map(String::as_str).collect();
        info!(count = apps.len(), "installing applications");
        apt_install(runner, root, &apps)?;
    }
    Ok(())
}

/// Join a wireless network on the live system.
pub fn connect_wifi(runner: &mut dyn CommandRunner, wifi: &WifiCredentials) -> Result<()> {
    let mut args = vec!["device", "wifi", "connect", wifi.ssid.as_str()];
    if !wifi.password.is_empty() {
        args.extend(["password", wifi.password.as_str()]);
    }
    runner.run("nmcli", &args).map(|_| ()).inspect_err(|e| {
        warn!(ssid = %wifi.ssid, "Wi-Fi connection failed: {}", e);
    })
}
