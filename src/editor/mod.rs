//! Interactive storage configuration.
//!
//! Two ways to produce a partition plan: wipe one disk with the standard
//! layout, or edit partitions by hand in an [`session::EditorSession`].

pub mod ops;
pub mod prompt;
pub mod selectors;
pub mod session;
pub mod state;

pub use prompt::{Answer, MenuOption, Prompter, ScriptedPrompter};
pub use session::EditorSession;
pub use state::{EditorEvent, EditorMachine, EditorState};

use crate::disk::layout::{max_home_gib, whole_disk_layout, MIN_HOME_GIB};
use crate::disk::model::Disk;
use crate::disk::size::format_gib;
use crate::error::Result;
use crate::hardware::FirmwareMode;
use prompt::choose;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    EntireDisk,
    Advanced,
}

/// Ask how to partition and return the accepted plan.
pub fn configure_storage(
    prompter: &mut dyn Prompter,
    firmware: FirmwareMode,
    inventory: &[Disk],
) -> Result<Vec<Disk>> {
    let modes = [
        MenuOption::new("Use entire disk", Mode::EntireDisk),
        MenuOption::new("Advanced (manual partitioning)", Mode::Advanced),
    ];

    loop {
        let plan = match choose(prompter, "Choose the installation type", &modes)? {
            Mode::EntireDisk => entire_disk(prompter, firmware, inventory)?.map(|disk| vec![disk]),
            Mode::Advanced => EditorSession::new(prompter, firmware, inventory.to_vec()).run()?,
        };
        if let Some(plan) = plan {
            info!(disks = plan.len(), "storage configured");
            return Ok(plan);
        }
    }
}

/// Wipe-entire-disk flow. `None` when the user backs out.
pub fn entire_disk(prompter: &mut dyn Prompter, firmware: FirmwareMode, inventory: &[Disk]) -> Result<Option<Disk>> {
    let mut options: Vec<MenuOption<Option<usize>>> = inventory
        .iter()
        .enumerate()
        .map(|(i, d)| MenuOption::new(format!("{} ({})", d.name, format_gib(d.bytes)), Some(i)))
        .collect();
    options.push(MenuOption::new("Back", None));

    let Some(index) = choose(prompter, "Select the disk to install to", &options)? else {
        return Ok(None);
    };
    let disk = &inventory[index];

    let message = format!("Everything on {} will be erased. Continue?", disk.name);
    if !prompter.confirm(&message, false)? {
        return Ok(None);
    }

    let max_home = max_home_gib(disk.bytes, firmware);
    let home = if max_home >= MIN_HOME_GIB && prompter.confirm("Create a separate /home partition?", false)? {
        let message = format!("Size of /home in GB ({:.2} GB available)", max_home);
        Some(prompter.number(&message, MIN_HOME_GIB, max_home)?)
    } else {
        None
    };

    let layout = whole_disk_layout(disk, firmware, home)?;
    info!(disk = %layout.name, partitions = layout.partitions.len(), "whole-disk layout");
    Ok(Some(layout))
}
