// Installer configuration
//
// Settings are explicit values handed from step to step. Non-secret defaults
// may be overridden from a JSON file; the disk and credentials are always
// asked interactively.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::disk::EFI_SIZE_MIB;
use crate::error::{InstallError, IoContext, Result};

/// Tunable, non-secret installation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallSettings {
    pub hostname: String,
    pub timezone: String,
    pub locale: String,
    pub keymap: String,
    /// Where the new root filesystem is mounted in the live environment
    pub mount_point: PathBuf,
    pub efi_size_mib: u32,
    pub extra_packages: Vec<String>,
    /// Supplementary groups for the created user
    pub user_groups: Vec<String>,
    pub services: Vec<String>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            hostname: "archvfio".to_string(),
            timezone: "UTC".to_string(),
            locale: "en_US.UTF-8".to_string(),
            keymap: "us".to_string(),
            mount_point: PathBuf::from("/mnt"),
            efi_size_mib: 512,
            extra_packages: Vec::new(),
            user_groups: vec![
                "wheel".to_string(),
                "libvirt".to_string(),
                "kvm".to_string(),
                "input".to_string(),
            ],
            services: vec!["NetworkManager".to_string(), "libvirtd".to_string()],
        }
    }
}

impl InstallSettings {
    /// Loads settings from a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .context(format!("Reading configuration file {}", path.display()))?;
        let settings: Self = serde_json::from_str(&data).map_err(|source| InstallError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_hostname(&self.hostname) {
            return Err(InstallError::InvalidInput(format!("hostname {:?}", self.hostname)));
        }
        if !EFI_SIZE_MIB.contains(&self.efi_size_mib) {
            return Err(InstallError::InvalidInput(format!(
                "EFI partition of {} MiB is outside {}..={} MiB",
                self.efi_size_mib,
                EFI_SIZE_MIB.start(),
                EFI_SIZE_MIB.end()
            )));
        }
        if !self.mount_point.is_absolute() {
            return Err(InstallError::InvalidInput(format!(
                "mount point {} must be absolute",
                self.mount_point.display()
            )));
        }
        Ok(())
    }

    /// Mount point as a command argument
    pub fn root(&self) -> String {
        self.mount_point.to_string_lossy().into_owned()
    }
}

/// Everything the operator types in before the disk is touched
#[derive(Debug, Clone)]
pub struct InstallAnswers {
    pub disk: String,
    pub root_password: String,
    pub user: UserAccount,
}

#[derive(Debug, Clone)]
pub struct UserAccount {
    pub name: String,
    pub password: String,
}

impl UserAccount {
    pub fn home(&self) -> PathBuf {
        Path::new("/home").join(&self.name)
    }
}

/// Linux user names: lowercase letter or underscore first, then [a-z0-9_-]
pub fn is_valid_username(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 32
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        && name != "root"
}

pub fn is_valid_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
