// Core modules of the Exliar installer

pub mod bootloader;
pub mod command;
pub mod config;
pub mod disk;
pub mod initcpio;
pub mod installer;
pub mod profile;
pub mod state;
pub mod system;
pub mod target;
pub mod vfio;
