// Bootloader handling for the installed system

pub mod grub;

use crate::core::command::Executor;
use crate::core::state::Change;
use crate::core::target::TargetRoot;
use crate::error::Result;

pub use grub::GrubConfig;

/// Trait for managing the bootloader of the target system
pub trait BootloaderManager {
    /// Reads the kernel command line parameters from the configuration
    fn get_config_parameters(&self, target: &TargetRoot) -> Result<Vec<String>>;

    /// Appends kernel parameters, replacing ones with the same key
    fn add_parameters(&self, target: &TargetRoot, params: &[String]) -> Result<Change>;

    /// Installs the bootloader into the EFI system partition
    fn install(&self, executor: &mut dyn Executor, root: &str) -> Result<()>;

    /// Regenerates the bootloader menu (e.g. grub.cfg)
    fn update_bootloader(&self, executor: &mut dyn Executor, root: &str) -> Result<()>;
}
