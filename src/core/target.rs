// Target system files
//
// All writes to the freshly installed system go through `TargetRoot`, which
// maps absolute target paths below the mount point, backs up files before
// editing them and honours dry-run mode.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::info;

use crate::core::config::InstallSettings;
use crate::core::state::Change;
use crate::error::{IoContext, Result};
use crate::utils::create_timestamped_backup;

/// The mounted root filesystem of the system being installed
#[derive(Debug, Clone)]
pub struct TargetRoot {
    root: PathBuf,
    dry_run: bool,
}

impl TargetRoot {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self { root: root.into(), dry_run }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of an absolute path inside the target
    pub fn path(&self, target_path: impl AsRef<Path>) -> PathBuf {
        let relative = target_path
            .as_ref()
            .strip_prefix("/")
            .unwrap_or_else(|_| target_path.as_ref());
        self.root.join(relative)
    }

    pub fn create_dir(&self, target_path: impl AsRef<Path>) -> Result<()> {
        let path = self.path(target_path);
        if self.dry_run {
            info!("[DRY RUN] Would create directory {}", path.display());
            return Ok(());
        }
        fs::create_dir_all(&path).context(format!("Creating directory {}", path.display()))
    }

    /// Creates or replaces a file
    pub fn write(&self, target_path: impl AsRef<Path>, content: &str) -> Result<Change> {
        let path = self.path(target_path);
        if self.dry_run {
            info!("[DRY RUN] Would write {}:", path.display());
            for line in content.lines() {
                info!("  {}", line);
            }
            return Ok(Change::FileWritten { path });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(format!("Creating directory {}", parent.display()))?;
        }
        fs::write(&path, content).context(format!("Writing {}", path.display()))?;
        info!("Wrote {}", path.display());
        Ok(Change::FileWritten { path })
    }

    /// Like `write`, then marks the file executable
    pub fn write_executable(&self, target_path: impl AsRef<Path>, content: &str) -> Result<Change> {
        let change = self.write(&target_path, content)?;
        if !self.dry_run {
            let path = self.path(target_path);
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .context(format!("Making {} executable", path.display()))?;
        }
        Ok(change)
    }

    /// Appends to a file, creating it when missing
    pub fn append(&self, target_path: impl AsRef<Path>, content: &str) -> Result<Change> {
        let path = self.path(target_path);
        if self.dry_run {
            info!("[DRY RUN] Would append {} bytes to {}", content.len(), path.display());
            return Ok(Change::FileModified { path, backup_path: None });
        }

        let mut current = fs::read_to_string(&path).unwrap_or_default();
        current.push_str(content);
        fs::write(&path, current).context(format!("Appending to {}", path.display()))?;
        Ok(Change::FileModified { path, backup_path: None })
    }

    /// Rewrites an existing file through `edit`, keeping a timestamped backup.
    ///
    /// The file must exist: the base system installs every file edited here.
    pub fn edit<F>(&self, target_path: impl AsRef<Path>, edit: F) -> Result<Change>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let path = self.path(target_path);
        if self.dry_run && !path.exists() {
            info!("[DRY RUN] Would edit {}", path.display());
            return Ok(Change::FileModified { path, backup_path: None });
        }

        let current = fs::read_to_string(&path).context(format!("Reading {}", path.display()))?;
        let updated = edit(&current)?;

        if updated == current {
            info!("{} is already up-to-date.", path.display());
            return Ok(Change::FileModified { path, backup_path: None });
        }
        if self.dry_run {
            info!("[DRY RUN] Would modify {}", path.display());
            return Ok(Change::FileModified { path, backup_path: None });
        }

        let backup_path = create_timestamped_backup(&path)
            .context(format!("Backing up {}", path.display()))?;
        fs::write(&path, updated).context(format!("Writing {}", path.display()))?;
        info!("Updated {} (backup: {})", path.display(), backup_path.display());
        Ok(Change::FileModified { path, backup_path: Some(backup_path) })
    }
}

pub fn vconsole_conf(settings: &InstallSettings) -> String {
    format!("KEYMAP={}\n", settings.keymap)
}

pub fn locale_conf(settings: &InstallSettings) -> String {
    format!("LANG={}\n", settings.locale)
}

pub fn hostname_file(settings: &InstallSettings) -> String {
    format!("{}\n", settings.hostname)
}

pub fn hosts_file(settings: &InstallSettings) -> String {
    format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{host}.localdomain\t{host}\n",
        host = settings.hostname
    )
}

pub fn sudoers_wheel() -> &'static str {
    "%wheel ALL=(ALL:ALL) ALL\n"
}

/// Uncomments the `<locale> <charset>` line of /etc/locale.gen, or appends it
pub fn enable_locale(locale_gen: &str, locale: &str) -> String {
    let charset = locale.rsplit_once('.').map(|(_, c)| c).unwrap_or("UTF-8");
    let wanted = format!("{} {}", locale, charset);

    let mut found = false;
    let mut lines: Vec<String> = locale_gen
        .lines()
        .map(|line| {
            let uncommented = line.trim_start_matches('#').trim();
            if uncommented == wanted {
                found = true;
                wanted.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !found {
        lines.push(wanted);
    }
    lines.join("\n") + "\n"
}
