// Vendor-conditioned configuration
//
// The only decision the installer makes about the hardware: which microcode,
// graphics drivers, early kernel modules and IOMMU flag go with the CPU
// vendor. Both vendors live in one static table.

use serde::Serialize;

use crate::core::system::CpuVendor;
use crate::error::{InstallError, Result};

/// Packages installed regardless of vendor
pub static BASE_PACKAGES: [&str; 9] = [
    "base",
    "base-devel",
    "linux",
    "linux-headers",
    "linux-firmware",
    "grub",
    "efibootmgr",
    "networkmanager",
    "sudo",
];

/// Virtualization stack for the passthrough host
pub static VIRTUALIZATION_PACKAGES: [&str; 8] = [
    "qemu-full",
    "libvirt",
    "virt-manager",
    "edk2-ovmf",
    "dnsmasq",
    "iptables-nft",
    "bridge-utils",
    "mesa",
];

/// Configuration bundle selected by CPU vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorProfile {
    pub vendor: CpuVendor,
    pub microcode_package: &'static str,
    pub gpu_driver_packages: &'static [&'static str],
    pub kernel_modules: &'static [&'static str],
    pub iommu_flag: &'static str,
}

static INTEL: VendorProfile = VendorProfile {
    vendor: CpuVendor::Intel,
    microcode_package: "intel-ucode",
    gpu_driver_packages: &["xf86-video-intel", "vulkan-intel"],
    kernel_modules: &["vfio", "vfio_iommu_type1", "vfio_pci", "vfio_virqfd", "intel_agp", "i915"],
    iommu_flag: "intel_iommu=on",
};

static AMD: VendorProfile = VendorProfile {
    vendor: CpuVendor::Amd,
    microcode_package: "amd-ucode",
    gpu_driver_packages: &["xf86-video-amdgpu", "vulkan-radeon"],
    kernel_modules: &["vfio", "vfio_iommu_type1", "vfio_pci", "vfio_virqfd", "amdgpu"],
    iommu_flag: "amd_iommu=on",
};

impl VendorProfile {
    /// Looks up the profile for a detected vendor.
    ///
    /// `Unknown` has no profile; the caller must abort before touching disks.
    pub fn resolve(vendor: CpuVendor) -> Result<&'static VendorProfile> {
        match vendor {
            CpuVendor::Intel => Ok(&INTEL),
            CpuVendor::Amd => Ok(&AMD),
            CpuVendor::Unknown => Err(InstallError::UnsupportedCpu),
        }
    }

    /// Full `pacstrap` package list, deduplicated, in install order
    pub fn packages(&self, extra: &[String]) -> Vec<String> {
        let mut packages: Vec<String> = Vec::new();
        let candidates = BASE_PACKAGES
            .iter()
            .chain(std::iter::once(&self.microcode_package))
            .chain(self.gpu_driver_packages.iter())
            .chain(VIRTUALIZATION_PACKAGES.iter())
            .map(|p| p.to_string())
            .chain(extra.iter().cloned());

        for package in candidates {
            if !packages.contains(&package) {
                packages.push(package);
            }
        }
        packages
    }

    /// Kernel command line parameters enabling passthrough for `gpu_ids`
    pub fn kernel_parameters(&self, gpu_ids: &[String]) -> Vec<String> {
        vec![
            self.iommu_flag.to_string(),
            "iommu=pt".to_string(),
            format!("vfio-pci.ids={}", gpu_ids.join(",")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<String> {
        vec!["10de:2484".to_string(), "10de:228b".to_string()]
    }

    #[test]
    fn intel_profile() {
        let profile = VendorProfile::resolve(CpuVendor::Intel).unwrap();
        assert_eq!(profile.vendor, CpuVendor::Intel);
        assert_eq!(profile.microcode_package, "intel-ucode");
        assert_eq!(profile.iommu_flag, "intel_iommu=on");
        assert!(profile.kernel_modules.contains(&"intel_agp"));
        assert!(profile.kernel_modules.contains(&"i915"));
        assert_eq!(profile.gpu_driver_packages, &["xf86-video-intel", "vulkan-intel"]);
    }

    #[test]
    fn amd_profile() {
        let profile = VendorProfile::resolve(CpuVendor::Amd).unwrap();
        assert_eq!(profile.microcode_package, "amd-ucode");
        assert_eq!(profile.iommu_flag, "amd_iommu=on");
        assert!(profile.kernel_modules.contains(&"amdgpu"));
        assert!(!profile.kernel_modules.contains(&"i915"));
    }

    #[test]
    fn unknown_vendor_has_no_profile() {
        assert!(matches!(
            VendorProfile::resolve(CpuVendor::Unknown),
            Err(InstallError::UnsupportedCpu)
        ));
    }

    #[test]
    fn every_profile_starts_with_the_vfio_modules() {
        for vendor in [CpuVendor::Intel, CpuVendor::Amd] {
            let profile = VendorProfile::resolve(vendor).unwrap();
            assert_eq!(&profile.kernel_modules[..4], &["vfio", "vfio_iommu_type1", "vfio_pci", "vfio_virqfd"]);
        }
    }

    #[test]
    fn resolving_twice_is_identical() {
        let first = VendorProfile::resolve(CpuVendor::Amd).unwrap().clone();
        let second = VendorProfile::resolve(CpuVendor::Amd).unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn kernel_parameters_are_ordered() {
        let profile = VendorProfile::resolve(CpuVendor::Intel).unwrap();
        assert_eq!(
            profile.kernel_parameters(&ids()).join(" "),
            "intel_iommu=on iommu=pt vfio-pci.ids=10de:2484,10de:228b"
        );
    }

    #[test]
    fn package_list_includes_vendor_packages_once() {
        let profile = VendorProfile::resolve(CpuVendor::Amd).unwrap();
        let extra = vec!["vim".to_string(), "mesa".to_string()];
        let packages = profile.packages(&extra);
        assert_eq!(packages[0], "base");
        assert!(packages.contains(&"amd-ucode".to_string()));
        assert!(packages.contains(&"vulkan-radeon".to_string()));
        assert_eq!(packages.last().map(String::as_str), Some("vim"));
        assert_eq!(packages.iter().filter(|p| *p == "mesa").count(), 1);
    }
}
