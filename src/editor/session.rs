//! Advanced partitioning session.
//!
//! Drives [`EditorMachine`] against a [`Prompter`]. Each disk is edited on a
//! private copy; the copy replaces the committed layout only when the user
//! accepts at confirmation, so rejecting or backing out never leaves a
//! partially applied edit behind.

use super::ops::{self, MountDecision, MIN_PARTITION_GIB};
use super::prompt::{choose, MenuOption, Prompter};
use super::selectors::{select_filesystem, select_mount_point};
use super::state::{EditorEvent, EditorMachine, EditorState};
use crate::disk::model::{Disk, Partition};
use crate::disk::size::format_gib;
use crate::disk::validate::validate_plan;
use crate::error::{InstallerError, Result};
use crate::hardware::FirmwareMode;
use tracing::{debug, info, warn};

const BACK: &str = "back";
const FINISH: &str = "finish";
const CREATE: &str = "free";

/// One row of the partition table shown while editing.
pub fn status_line(partition: &Partition) -> String {
    let action = if partition.erase { "Format" } else { "Keep" };
    let name = partition.name.as_deref().unwrap_or("-");
    let display = match &partition.uuid {
        Some(uuid) => format!("{} ({})", name, uuid),
        None => name.to_string(),
    };
    let size = match partition.size.explicit_bytes() {
        Some(bytes) => format_gib(bytes),
        None => partition.size.to_string(),
    };
    let fs = partition
        .filesystem
        .map(|fs| fs.to_string().to_uppercase())
        .unwrap_or_else(|| "-".to_string());
    let mount = partition.mount_point.as_deref().unwrap_or("-");
    format!("{:<6} │ {:<36} │ {:>11} │ {:<6} │ {}", action, display, size, fs, mount)
}

/// Table of every live partition on `disk`.
pub fn status_table(disk: &Disk) -> String {
    let mut lines = vec![format!(
        "{:<6} │ {:<36} │ {:>11} │ {:<6} │ {}",
        "Action", "Partition (name/UUID)", "Size", "FS", "Mount"
    )];
    lines.extend(disk.live().map(status_line));
    lines.join("\n")
}

/// Interactive editor over a disk inventory.
pub struct EditorSession<'a> {
    prompter: &'a mut dyn Prompter,
    firmware: FirmwareMode,
    inventory: Vec<Disk>,
    /// Disks whose edits were accepted
    committed: Vec<Disk>,
    /// Working copy of the disk being edited
    working: Option<Disk>,
    machine: EditorMachine,
}

impl<'a> EditorSession<'a> {
    pub fn new(prompter: &'a mut dyn Prompter, firmware: FirmwareMode, inventory: Vec<Disk>) -> Self {
        Self {
            prompter,
            firmware,
            inventory,
            committed: Vec::new(),
            working: None,
            machine: EditorMachine::new(),
        }
    }

    pub fn state(&self) -> &EditorState {
        self.machine.state()
    }

    /// Run until the user finishes (`Some(plan)`) or backs out (`None`).
    pub fn run(mut self) -> Result<Option<Vec<Disk>>> {
        loop {
            let state = self.machine.state().clone();
            debug!(%state, "editor");
            match state {
                EditorState::SelectingDisk => {
                    if let Some(done) = self.select_disk()? {
                        return Ok(done);
                    }
                }
                EditorState::ManagingPartitions { .. } => self.manage_partitions()?,
                EditorState::EditingPartition { target, .. } => self.edit_partition(&target)?,
                EditorState::CreatingPartition { .. } => self.create_partition()?,
                EditorState::Confirming { .. } => self.confirm()?,
                EditorState::Accepted | EditorState::Discarded => self.machine.restart(),
            }
        }
    }

    fn event(&mut self, event: EditorEvent) -> Result<()> {
        self.machine
            .apply(event)
            .map(|_| ())
            .map_err(|e| InstallerError::prompt(e.to_string()))
    }

    fn working(&mut self) -> Result<&mut Disk> {
        self.working
            .as_mut()
            .ok_or_else(|| InstallerError::prompt("no disk is being edited"))
    }

    /// `Some(result)` ends the session.
    fn select_disk(&mut self) -> Result<Option<Option<Vec<Disk>>>> {
        let mut options: Vec<MenuOption<String>> = self
            .inventory
            .iter()
            .enumerate()
            .map(|(i, disk)| {
                let edited = if self.committed.iter().any(|d| d.name == disk.name) { "  (edited)" } else { "" };
                MenuOption::new(format!("{:<14} │ {}{}", disk.name, format_gib(disk.bytes), edited), i.to_string())
            })
            .collect();
        if !self.committed.is_empty() {
            options.push(MenuOption::new("Done, use this layout", FINISH.to_string()));
        }
        options.push(MenuOption::new("Back", BACK.to_string()));

        let choice = choose(self.prompter, "Select the disk to configure", &options)?;
        match choice.as_str() {
            BACK => Ok(Some(None)),
            FINISH => Ok(Some(Some(std::mem::take(&mut self.committed)))),
            index => {
                let index: usize = index
                    .parse()
                    .map_err(|_| InstallerError::prompt(format!("bad disk choice {}", index)))?;
                let disk = self.inventory[index].clone();
                self.working = Some(
                    self.committed
                        .iter()
                        .find(|d| d.name == disk.name)
                        .cloned()
                        .unwrap_or(disk),
                );
                self.event(EditorEvent::DiskChosen(index))?;
                Ok(None)
            }
        }
    }

    fn manage_partitions(&mut self) -> Result<()> {
        let disk = self.working()?.clone();

        let mut options: Vec<MenuOption<String>> = disk
            .live()
            .filter_map(|p| p.id().map(|id| MenuOption::new(status_line(p), id.to_string())))
            .collect();
        if ops::can_create(&disk) {
            options.push(MenuOption::new(
                format!("Create new partition ({:.2} GB free)", ops::free_gib(&disk)),
                CREATE.to_string(),
            ));
        }
        options.push(MenuOption::new("Back", BACK.to_string()));
        options.push(MenuOption::new("Finish", FINISH.to_string()));

        let message = format!(
            "Partitions on {} ({})\n{}",
            disk.name,
            format_gib(disk.bytes),
            status_table(&disk).lines().next().unwrap_or_default()
        );
        let choice = choose(self.prompter, &message, &options)?;
        match choice.as_str() {
            BACK => {
                self.working = None;
                self.event(EditorEvent::Back)
            }
            FINISH => self.event(EditorEvent::Finish),
            CREATE => self.event(EditorEvent::FreeSpaceChosen),
            target => self.event(EditorEvent::PartitionChosen(target.to_string())),
        }
    }

    fn edit_partition(&mut self, target: &str) -> Result<()> {
        let index = match ops::resolve(self.working()?, target) {
            Ok(index) => index,
            Err(e) => {
                warn!("{}", e);
                self.prompter.notify(&e.to_string());
                return self.event(EditorEvent::Done);
            }
        };
        let partition = self.working()?.partitions[index].clone();

        let actions = vec![
            MenuOption::new("Change filesystem", "format"),
            MenuOption::new("Erase data", "erase"),
            MenuOption::new("Change mount point", "mount"),
            MenuOption::new("Resize", "resize"),
            MenuOption::new("Delete partition", "delete"),
            MenuOption::new("Back", BACK),
        ];
        let message = format!("Manage {} ({})", partition.label(), partition.size);
        let action = choose(self.prompter, &message, &actions)?;

        match action {
            "format" => {
                let kind = select_filesystem(self.prompter, self.firmware)?;
                let decision = ops::change_filesystem(self.working()?, index, kind);
                if decision == MountDecision::Prompt {
                    let mount_point = select_mount_point(self.prompter)?;
                    self.apply_mount_point(index, mount_point)?;
                }
                let updated = self.working()?.partitions[index].clone();
                let status = if updated.erase { "will be formatted" } else { "kept" };
                self.prompter.notify(&format!(
                    "{}: {} → {} ({})",
                    updated.label(),
                    updated.filesystem.map(|f| f.to_string()).unwrap_or_default(),
                    updated.mount_point.as_deref().unwrap_or("not mounted"),
                    status
                ));
            }
            "erase" => {
                if self.prompter.confirm("Really erase the data on this partition?", false)? {
                    ops::erase(self.working()?, index);
                }
            }
            "mount" => {
                let mount_point = select_mount_point(self.prompter)?;
                self.apply_mount_point(index, mount_point)?;
            }
            "resize" => {
                let max = ops::max_resize_gib(self.working()?, index);
                let message = format!(
                    "New size for {} in GB (current {}, max {:.2})",
                    partition.label(),
                    partition.size,
                    max
                );
                let gib = self.prompter.number(&message, MIN_PARTITION_GIB, max)?;
                if let Err(e) = ops::resize(self.working()?, index, gib) {
                    self.prompter.notify(&e.to_string());
                }
            }
            "delete" => {
                let message = format!(
                    "Delete {}? All data on it will be lost.",
                    partition.label()
                );
                if self.prompter.confirm(&message, false)? {
                    ops::delete(self.working()?, index);
                    self.prompter.notify(&format!("{} removed", partition.label()));
                } else {
                    self.prompter.notify("Cancelled");
                }
            }
            _ => {}
        }

        self.event(EditorEvent::Done)
    }

    fn apply_mount_point(&mut self, index: usize, mount_point: String) -> Result<()> {
        if let Err(e) = ops::set_mount_point(self.working()?, index, Some(mount_point)) {
            self.prompter.notify(&e.to_string());
        }
        Ok(())
    }

    fn create_partition(&mut self) -> Result<()> {
        let free = ops::free_gib(self.working()?);
        let message = format!("Size of the new partition in GB ({:.2} GB available)", free);
        let gib = self.prompter.number(&message, MIN_PARTITION_GIB, free)?;
        let kind = select_filesystem(self.prompter, self.firmware)?;

        match ops::create(self.working()?, gib, kind) {
            Ok((index, MountDecision::Prompt)) => {
                let mount_point = select_mount_point(self.prompter)?;
                self.apply_mount_point(index, mount_point)?;
            }
            Ok(_) => {}
            Err(e) => self.prompter.notify(&e.to_string()),
        }

        self.event(EditorEvent::Done)
    }

    /// Layout the plan would have with the working copy accepted.
    fn candidate_plan(&self) -> Vec<Disk> {
        let mut plan: Vec<Disk> = self.committed.clone();
        if let Some(working) = &self.working {
            match plan.iter_mut().find(|d| d.name == working.name) {
                Some(slot) => *slot = working.clone(),
                None => plan.push(working.clone()),
            }
        }
        plan
    }

    fn confirm(&mut self) -> Result<()> {
        let plan = self.candidate_plan();
        let issues = validate_plan(&plan);
        if !issues.is_empty() {
            self.prompter.notify("The layout cannot be used yet:");
            for issue in &issues {
                self.prompter.notify(&format!("  - {}", issue));
            }
            return self.event(EditorEvent::Invalid);
        }

        let working = self.working()?.clone();
        self.prompter.notify(&format!("Summary for {}:\n{}", working.name, status_table(&working)));

        if self.prompter.confirm("Apply all changes?", false)? {
            info!(disk = %working.name, "partition layout accepted");
            self.committed = plan;
            self.working = None;
            self.event(EditorEvent::Accept)
        } else {
            info!(disk = %working.name, "partition edits discarded");
            self.prompter.notify("Changes discarded");
            self.working = None;
            self.event(EditorEvent::Reject)
        }
    }
}
