//! `/etc/fstab` for the provisioned root.
//!
//! `genfstab -U` is tried first. When it is missing or its output has no
//! root line, the table is rebuilt from the mount plan with UUIDs read via
//! `blkid`.

use super::mount::MountEntry;
use crate::error::{InstallerError, Result};
use crate::process::CommandRunner;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub uuid: String,
    pub mount_point: String,
    pub fstype: String,
}

impl FstabEntry {
    /// fsck pass: 1 for root, 2 for everything else.
    pub fn pass(&self) -> u8 {
        if self.mount_point == "/" { 1 } else { 2 }
    }

    pub fn line(&self) -> String {
        format!(
            "UUID={} {} {} defaults 0 {}",
            self.uuid,
            self.mount_point,
            self.fstype,
            self.pass()
        )
    }
}

/// Render entries with root first, then the rest by mount point.
pub fn render_fstab(entries: &[FstabEntry]) -> String {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| {
        (a.mount_point != "/")
            .cmp(&(b.mount_point != "/"))
            .then_with(|| a.mount_point.cmp(&b.mount_point))
    });

    let mut out = String::from("# /etc/fstab: static file system information.\n");
    out.push_str("# <file system> <mount point> <type> <options> <dump> <pass>\n");
    for entry in &sorted {
        out.push_str(&entry.line());
        out.push('\n');
    }
    out
}

/// True if `fstab` mounts something at `/` by UUID.
pub fn has_root_entry(fstab: &str) -> bool {
    fstab
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .any(|line| {
            let mut fields = line.split_whitespace();
            matches!(
                (fields.next(), fields.next()),
                (Some(spec), Some("/")) if spec.starts_with("UUID=")
            )
        })
}

/// Build fstab entries from the mount plan, asking `blkid` for UUIDs that
/// were not known when the plan was compiled.
pub fn entries_from_mounts(runner: &mut dyn CommandRunner, mounts: &[MountEntry]) -> Vec<FstabEntry> {
    mounts
        .iter()
        .filter_map(|mount| {
            let uuid = match &mount.uuid {
                Some(uuid) => uuid.clone(),
                None => match runner.run("blkid", &["-s", "UUID", "-o", "value", &mount.device]) {
                    Ok(uuid) if !uuid.is_empty() => uuid,
                    _ => {
                        warn!(device = %mount.device, "no UUID found, leaving it out of fstab");
                        return None;
                    }
                },
            };
            Some(FstabEntry {
                uuid,
                mount_point: mount.mount_point.clone(),
                fstype: mount.filesystem.mount_type().to_string(),
            })
        })
        .collect()
}

/// Generate and write `<root>/etc/fstab`.
pub fn generate_fstab(runner: &mut dyn CommandRunner, root: &Path, mounts: &[MountEntry]) -> Result<String> {
    let root_arg = root.display().to_string();

    let contents = match runner.run("genfstab", &["-U", &root_arg]) {
        Ok(generated) if has_root_entry(&generated) => {
            info!("using genfstab output");
            format!("{}\n", generated)
        }
        Ok(_) => {
            warn!("genfstab produced no root entry, building fstab from the plan");
            fallback_fstab(runner, mounts)?
        }
        Err(e) => {
            warn!("genfstab unavailable ({}), building fstab from the plan", e);
            fallback_fstab(runner, mounts)?
        }
    };

    let etc = root.join("etc");
    std::fs::create_dir_all(&etc)?;
    std::fs::write(etc.join("fstab"), &contents)?;
    info!(path = %etc.join("fstab").display(), "wrote fstab");
    Ok(contents)
}

fn fallback_fstab(runner: &mut dyn CommandRunner, mounts: &[MountEntry]) -> Result<String> {
    let entries = entries_from_mounts(runner, mounts);
    let rendered = render_fstab(&entries);
    if !has_root_entry(&rendered) {
        return Err(InstallerError::config("cannot build fstab: root partition has no UUID"));
    }
    Ok(rendered)
}
