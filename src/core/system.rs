// Host detection for the Exliar installer
//
// This module inspects the live environment the installer runs from:
// - CPU vendor (Intel, AMD or unknown)
// - Hardware virtualization flags
// - UEFI firmware variables

use std::fmt;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::command::{Executor, Invocation};

/// Directory that only exists when the live system was booted through UEFI
pub const EFIVARS_DIR: &str = "/sys/firmware/efi/efivars";

pub const CPUINFO: &str = "/proc/cpuinfo";

const INTEL_SIGNATURE: &str = "GenuineIntel";
const AMD_SIGNATURE: &str = "AuthenticAMD";

/// Represents the system's CPU vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

impl fmt::Display for CpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CpuVendor::Intel => write!(f, "Intel"),
            CpuVendor::Amd => write!(f, "AMD"),
            CpuVendor::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Contains what the installer needs to know about the host
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub cpu_vendor: CpuVendor,
    pub virtualization_enabled: bool,
    pub uefi: bool,
}

impl HostInfo {
    /// Probes with an explicit cpuinfo text and efivars location
    pub fn probe(executor: &mut dyn Executor, cpuinfo: &str, efivars: &Path) -> Self {
        HostInfo {
            cpu_vendor: probe_cpu_vendor(executor, cpuinfo),
            virtualization_enabled: virtualization_flag_present(cpuinfo),
            uefi: is_uefi_boot(efivars),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "CPU Vendor: {}\nVirtualization: {}\nFirmware: {}",
            self.cpu_vendor,
            if self.virtualization_enabled { "Enabled" } else { "Disabled" },
            if self.uefi { "UEFI" } else { "BIOS" },
        )
    }
}

/// Runs `lscpu` and falls back to /proc/cpuinfo when it reports no vendor.
///
/// Detection never fails: a missing or failing `lscpu` is the same as an
/// unrecognised signature.
pub fn probe_cpu_vendor(executor: &mut dyn Executor, cpuinfo: &str) -> CpuVendor {
    let lscpu = executor
        .output(&Invocation::probe("lscpu"), "Reading CPU information")
        .unwrap_or_else(|e| {
            debug!("lscpu unavailable: {}", e);
            String::new()
        });

    match detect_cpu_vendor(&lscpu) {
        CpuVendor::Unknown => detect_cpu_vendor_from_cpuinfo(cpuinfo),
        vendor => vendor,
    }
}

/// Detects the CPU vendor from `lscpu` output.
///
/// Intel is checked before AMD; the first match wins.
pub fn detect_cpu_vendor(lscpu_output: &str) -> CpuVendor {
    let vendor_line = lscpu_output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Vendor ID"));

    match vendor_line {
        Some(line) => vendor_from_signature(line),
        None => CpuVendor::Unknown,
    }
}

/// Detects the CPU vendor from the first `vendor_id` line of /proc/cpuinfo
pub fn detect_cpu_vendor_from_cpuinfo(cpuinfo: &str) -> CpuVendor {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("vendor_id"))
        .map(vendor_from_signature)
        .unwrap_or(CpuVendor::Unknown)
}

fn vendor_from_signature(line: &str) -> CpuVendor {
    let value = line.split(':').nth(1).map(str::trim).unwrap_or_default();
    if value.contains(INTEL_SIGNATURE) {
        CpuVendor::Intel
    } else if value.contains(AMD_SIGNATURE) {
        CpuVendor::Amd
    } else {
        CpuVendor::Unknown
    }
}

/// Checks for the AMD-V (svm) or Intel VT-x (vmx) CPU flag
pub fn virtualization_flag_present(cpuinfo: &str) -> bool {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("flags"))
        .map(|line| line.split_whitespace().any(|f| f == "svm" || f == "vmx"))
        .unwrap_or(false)
}

/// UEFI firmware exposes its variables under sysfs
pub fn is_uefi_boot(efivars: &Path) -> bool {
    efivars.is_dir()
}
