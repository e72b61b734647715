//! Editor state machine.
//!
//! ```text
//! SelectingDisk
//!     ↓ DiskChosen
//! ManagingPartitions ──PartitionChosen──▶ EditingPartition ──Done──┐
//!     │  ▲        └────FreeSpaceChosen──▶ CreatingPartition ─Done──┤
//!     │  └─────────────────────────────────────────────────────────┘
//!     ↓ Finish
//! Confirming ──Invalid──▶ ManagingPartitions
//!     ├─Accept──▶ Accepted
//!     └─Reject──▶ Discarded
//! ```
//!
//! `Back` pops the state history. Backing out of `SelectingDisk` discards.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorState {
    SelectingDisk,
    ManagingPartitions { disk: usize },
    /// `target` is the partition's UUID or device name
    EditingPartition { disk: usize, target: String },
    CreatingPartition { disk: usize },
    Confirming { disk: usize },
    Accepted,
    Discarded,
}

impl EditorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Discarded)
    }

    /// Disk being edited, if any.
    pub fn disk(&self) -> Option<usize> {
        match self {
            Self::ManagingPartitions { disk }
            | Self::EditingPartition { disk, .. }
            | Self::CreatingPartition { disk }
            | Self::Confirming { disk } => Some(*disk),
            _ => None,
        }
    }
}

impl fmt::Display for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectingDisk => write!(f, "SelectingDisk"),
            Self::ManagingPartitions { disk } => write!(f, "ManagingPartitions(disk {})", disk),
            Self::EditingPartition { disk, target } => {
                write!(f, "EditingPartition(disk {}, {})", disk, target)
            }
            Self::CreatingPartition { disk } => write!(f, "CreatingPartition(disk {})", disk),
            Self::Confirming { disk } => write!(f, "Confirming(disk {})", disk),
            Self::Accepted => write!(f, "Accepted"),
            Self::Discarded => write!(f, "Discarded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    DiskChosen(usize),
    PartitionChosen(String),
    FreeSpaceChosen,
    /// An edit or create finished (applied or cancelled)
    Done,
    Finish,
    /// Validation failed at confirmation
    Invalid,
    Accept,
    Reject,
    Back,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("event {event:?} is not valid in state {from}")]
pub struct InvalidTransition {
    pub from: EditorState,
    pub event: EditorEvent,
}

/// Current state plus the history `Back` returns through.
#[derive(Debug, Clone)]
pub struct EditorMachine {
    state: EditorState,
    history: Vec<EditorState>,
}

impl Default for EditorMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorMachine {
    pub fn new() -> Self {
        Self {
            state: EditorState::SelectingDisk,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn depth(&self) -> usize {
        self.history.len()
    }

    /// Start over at disk selection.
    pub fn restart(&mut self) {
        self.state = EditorState::SelectingDisk;
        self.history.clear();
    }

    pub fn apply(&mut self, event: EditorEvent) -> Result<&EditorState, InvalidTransition> {
        use EditorEvent as E;
        use EditorState as S;

        let invalid = |from: &EditorState, event: EditorEvent| InvalidTransition {
            from: from.clone(),
            event,
        };

        match (&self.state, event) {
            (S::Accepted | S::Discarded, event) => return Err(invalid(&self.state, event)),

            (_, E::Back) => self.back(),

            (S::SelectingDisk, E::DiskChosen(disk)) => self.push(S::ManagingPartitions { disk }),

            (S::ManagingPartitions { disk }, E::PartitionChosen(target)) => {
                let disk = *disk;
                self.push(S::EditingPartition { disk, target })
            }
            (S::ManagingPartitions { disk }, E::FreeSpaceChosen) => {
                let disk = *disk;
                self.push(S::CreatingPartition { disk })
            }
            (S::ManagingPartitions { disk }, E::Finish) => {
                let disk = *disk;
                self.push(S::Confirming { disk })
            }

            (S::EditingPartition { .. } | S::CreatingPartition { .. }, E::Done)
            | (S::Confirming { .. }, E::Invalid) => self.back(),

            (S::Confirming { .. }, E::Accept) => self.finish(S::Accepted),
            (S::Confirming { .. }, E::Reject) => self.finish(S::Discarded),

            (_, event) => return Err(invalid(&self.state, event)),
        }

        Ok(&self.state)
    }

    fn push(&mut self, next: EditorState) {
        let previous = std::mem::replace(&mut self.state, next);
        self.history.push(previous);
    }

    fn back(&mut self) {
        self.state = self.history.pop().unwrap_or(EditorState::Discarded);
    }

    fn finish(&mut self, terminal: EditorState) {
        self.history.clear();
        self.state = terminal;
    }
}
