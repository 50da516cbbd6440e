// Exliar installer
//
// Installs Arch Linux prepared for VFIO GPU passthrough: IOMMU kernel
// parameters, vfio-pci early binding and a libvirt host stack, selected by
// the CPU vendor.

// Detection, configuration and the installation steps
pub mod core;

// Error type shared by every step
pub mod error;

// Passthrough GPU discovery
pub mod gpu;

// Console output and prompts
pub mod ui;

// Utility functions
pub mod utils;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
