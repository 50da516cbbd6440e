// src/core/bootloader/grub.rs

use log::{info, warn};
use regex::Regex;

use super::BootloaderManager;
use crate::core::command::{Executor, Invocation};
use crate::core::state::Change;
use crate::core::target::TargetRoot;
use crate::error::{InstallError, Result};

pub const DEFAULT_GRUB: &str = "/etc/default/grub";
pub const GRUB_CFG: &str = "/boot/grub/grub.cfg";
pub const EFI_DIRECTORY: &str = "/boot/efi";

/// GRUB bootloader configuration manager
#[derive(Debug, Clone)]
pub struct GrubConfig {
    bootloader_id: String,
}

impl Default for GrubConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl GrubConfig {
    pub fn new() -> Self {
        Self { bootloader_id: "GRUB".to_string() }
    }
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| InstallError::InvalidInput(format!("Regex error: {}", e)))
}

/// Reads the GRUB_CMDLINE_LINUX_DEFAULT value, `None` when the line is missing
pub fn read_cmdline(content: &str) -> Result<Option<String>> {
    let re = regex(r#"(?m)^[ \t]*GRUB_CMDLINE_LINUX_DEFAULT[ \t]*=[ \t]*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)?;
    Ok(re
        .captures(content)
        .and_then(|caps| caps.name("dq").or_else(|| caps.name("sq")))
        .map(|m| m.as_str().to_string()))
}

/// Replaces the GRUB_CMDLINE_LINUX_DEFAULT value, appending the line if missing
pub fn write_cmdline(content: &str, params: &str) -> Result<String> {
    let re = regex(
        r#"(?m)^(?P<prefix>[ \t]*GRUB_CMDLINE_LINUX_DEFAULT[ \t]*=[ \t]*["'])(?P<params>.*?)(?P<suffix>["'][ \t]*)$"#,
    )?;

    if re.is_match(content) {
        let replacement = format!("${{prefix}}{}${{suffix}}", params.replace('$', "$$"));
        Ok(re.replace(content, replacement.as_str()).into_owned())
    } else {
        warn!("GRUB_CMDLINE_LINUX_DEFAULT line not found or malformed. Appending.");
        let mut content = content.to_string();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("GRUB_CMDLINE_LINUX_DEFAULT=\"{}\"\n", params));
        Ok(content)
    }
}

fn key_of(param: &str) -> &str {
    param.split('=').next().unwrap_or(param)
}

/// Appends `params` in order after dropping existing parameters with the same key
pub fn merge_parameters(current: &str, params: &[String]) -> String {
    let keys: Vec<&str> = params.iter().map(|p| key_of(p)).collect();
    current
        .split_whitespace()
        .filter(|p| !keys.contains(&key_of(p)))
        .map(str::to_string)
        .chain(params.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

impl BootloaderManager for GrubConfig {
    fn get_config_parameters(&self, target: &TargetRoot) -> Result<Vec<String>> {
        let path = target.path(DEFAULT_GRUB);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| InstallError::io(format!("Reading {}", path.display()), e))?;
        Ok(read_cmdline(&content)?
            .map(|cmdline| cmdline.split_whitespace().map(String::from).collect())
            .unwrap_or_default())
    }

    fn add_parameters(&self, target: &TargetRoot, params: &[String]) -> Result<Change> {
        info!("Adding parameters {:?} to GRUB config...", params);
        target.edit(DEFAULT_GRUB, |content| {
            let current = read_cmdline(content)?.unwrap_or_default();
            let merged = merge_parameters(&current, params);
            info!("  New GRUB_CMDLINE_LINUX_DEFAULT: \"{}\"", merged);
            write_cmdline(content, &merged)
        })
    }

    fn install(&self, executor: &mut dyn Executor, root: &str) -> Result<()> {
        info!("Installing GRUB to {}", EFI_DIRECTORY);
        executor.run(
            &Invocation::chroot(root, &["grub-install", "--target=x86_64-efi"])
                .arg(format!("--efi-directory={}", EFI_DIRECTORY))
                .arg(format!("--bootloader-id={}", self.bootloader_id)),
            "Installing the bootloader",
        )
    }

    fn update_bootloader(&self, executor: &mut dyn Executor, root: &str) -> Result<()> {
        info!("Generating {}", GRUB_CFG);
        executor.run(
            &Invocation::chroot(root, &["grub-mkconfig", "-o", GRUB_CFG]),
            "Generating the GRUB configuration",
        )
    }
}
