// mkinitcpio configuration
//
// The VFIO modules have to be in the initramfs so vfio-pci can claim the GPU
// before any graphics driver loads.

use log::info;
use regex::Regex;

use crate::core::command::{Executor, Invocation};
use crate::core::state::Change;
use crate::core::target::TargetRoot;
use crate::error::{InstallError, Result};

pub const MKINITCPIO_CONF: &str = "/etc/mkinitcpio.conf";

/// Puts `modules` at the front of the MODULES array, keeping other entries.
///
/// A configuration without a MODULES line gets one appended.
pub fn set_modules(content: &str, modules: &[&str]) -> Result<String> {
    let re = Regex::new(r"(?m)^MODULES=\((?P<modules>[^)]*)\)")
        .map_err(|e| InstallError::InvalidInput(format!("Regex error: {}", e)))?;

    let existing: Vec<String> = re
        .captures(content)
        .map(|caps| caps["modules"].split_whitespace().map(String::from).collect())
        .unwrap_or_default();

    let mut merged: Vec<String> = modules.iter().map(|m| m.to_string()).collect();
    for module in existing {
        if !merged.contains(&module) {
            merged.push(module);
        }
    }
    let line = format!("MODULES=({})", merged.join(" "));

    if re.is_match(content) {
        Ok(re.replace(content, regex::NoExpand(&line)).into_owned())
    } else {
        let mut content = content.to_string();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&line);
        content.push('\n');
        Ok(content)
    }
}

/// Writes the module list into the target's mkinitcpio.conf
pub fn configure_modules(target: &TargetRoot, modules: &[&str]) -> Result<Change> {
    info!("Preloading modules in initramfs: {}", modules.join(" "));
    target.edit(MKINITCPIO_CONF, |content| set_modules(content, modules))
}

/// Rebuilds every initramfs preset inside the target
pub fn regenerate(executor: &mut dyn Executor, root: &str) -> Result<()> {
    info!("Regenerating initramfs");
    executor.run(
        &Invocation::chroot(root, &["mkinitcpio", "-P"]),
        "Regenerating the initramfs",
    )
}
