// Installation progress tracking
//
// The installer is a one-way state machine. Every transition and every change
// made to the target is recorded so that, when a step fails, the operator
// knows what was left behind (mounted filesystems, edited files).

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{InstallError, IoContext, Result};

/// Stages of an installation, in the only order they can be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstallStage {
    Start,
    VendorDetected,
    DiskSelected,
    Partitioned,
    Formatted,
    Mounted,
    BaseInstalled,
    Configured,
    UserCreated,
    Unmounted,
    Done,
}

impl InstallStage {
    /// The stage that follows this one, `None` once done
    pub fn next(self) -> Option<InstallStage> {
        use InstallStage::*;
        match self {
            Start => Some(VendorDetected),
            VendorDetected => Some(DiskSelected),
            DiskSelected => Some(Partitioned),
            Partitioned => Some(Formatted),
            Formatted => Some(Mounted),
            Mounted => Some(BaseInstalled),
            BaseInstalled => Some(Configured),
            Configured => Some(UserCreated),
            UserCreated => Some(Unmounted),
            Unmounted => Some(Done),
            Done => None,
        }
    }

    /// Whether the target disk may already have been modified
    pub fn disk_touched(self) -> bool {
        self >= InstallStage::Partitioned
    }
}

/// Represents a single change made to the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// A file was created or overwritten
    FileWritten { path: PathBuf },
    /// An existing file was edited, backup created at the specified path
    FileModified { path: PathBuf, backup_path: Option<PathBuf> },
    /// A filesystem was mounted
    Mounted { device: String, target: PathBuf },
    /// All filesystems below the target were unmounted
    Unmounted { target: PathBuf },
    /// A mutating command was executed
    CommandRun { command: String },
}

/// Ordered record of stages and changes for one run
#[derive(Debug, Serialize, Deserialize)]
pub struct InstallJournal {
    stage: InstallStage,
    stages: Vec<InstallStage>,
    changes: Vec<Change>,
}

impl Default for InstallJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallJournal {
    pub fn new() -> Self {
        Self {
            stage: InstallStage::Start,
            stages: vec![InstallStage::Start],
            changes: Vec::new(),
        }
    }

    pub fn stage(&self) -> InstallStage {
        self.stage
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Moves to `to`, which must be the direct successor of the current stage
    pub fn advance(&mut self, to: InstallStage) -> Result<()> {
        if self.stage.next() != Some(to) {
            return Err(InstallError::Stage { from: self.stage, to });
        }
        debug!("Stage {:?} -> {:?}", self.stage, to);
        self.stage = to;
        self.stages.push(to);
        Ok(())
    }

    pub fn record(&mut self, change: Change) {
        debug!("Recording change: {:?}", change);
        self.changes.push(change);
    }

    /// Mount targets that were mounted and not unmounted afterwards
    pub fn active_mounts(&self) -> Vec<&Path> {
        let mut mounts: Vec<&Path> = Vec::new();
        for change in &self.changes {
            match change {
                Change::Mounted { target, .. } => mounts.push(target),
                Change::Unmounted { target } => mounts.retain(|m| !m.starts_with(target)),
                _ => {}
            }
        }
        mounts
    }

    /// Human readable hints for cleaning up after a failed run
    pub fn cleanup_hints(&self) -> Vec<String> {
        let mut hints = Vec::new();
        if !self.stage.disk_touched() {
            return hints;
        }

        if let Some(root) = self.active_mounts().first() {
            hints.push(format!("Filesystems are still mounted: umount -R {}", root.display()));
        }
        for change in &self.changes {
            if let Change::FileModified { path, backup_path: Some(backup) } = change {
                hints.push(format!("{} was edited, original kept at {}", path.display(), backup.display()));
            }
        }
        hints.push(format!(
            "The target disk was left in stage {:?}; it has to be repartitioned before retrying",
            self.stage
        ));
        hints
    }

    /// Writes the journal as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self).map_err(|e| {
            InstallError::io(
                format!("Serializing journal to {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context(format!("Creating {}", parent.display()))?;
            }
        }
        fs::write(path, serialized).context(format!("Writing journal {}", path.display()))?;
        Ok(())
    }

    /// Logs the cleanup hints as warnings
    pub fn report_failure(&self) {
        for hint in self.cleanup_hints() {
            warn!("{}", hint);
        }
    }
}
