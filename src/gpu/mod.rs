// GPU handling for the Exliar installer
//
// Finds the graphics card that will be handed to virtual machines and the
// PCI ids that vfio-pci has to claim at boot.

pub mod detection;

use std::fmt;

use serde::Serialize;

/// GPU vendors by PCI vendor id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GpuVendor {
    AMD,
    NVIDIA,
    Intel,
    Other(String),
}

impl GpuVendor {
    pub fn from_vendor_id(vendor_id: &str) -> Self {
        match vendor_id {
            "1002" => GpuVendor::AMD,
            "10de" => GpuVendor::NVIDIA,
            "8086" => GpuVendor::Intel,
            other => GpuVendor::Other(other.to_string()),
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GpuVendor::AMD => write!(f, "AMD"),
            GpuVendor::NVIDIA => write!(f, "NVIDIA"),
            GpuVendor::Intel => write!(f, "Intel"),
            GpuVendor::Other(id) => write!(f, "vendor {}", id),
        }
    }
}

/// One PCI function as listed by `lspci -nn`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PciFunction {
    pub slot: String,        // Bus:Device.Function, e.g. "01:00.0"
    pub class_code: String,  // e.g. "0300"
    pub description: String, // Everything between the class and the ids
    pub vendor_id: String,
    pub device_id: String,
}

impl PciFunction {
    /// `vendor:device` as vfio-pci expects it
    pub fn id(&self) -> String {
        format!("{}:{}", self.vendor_id, self.device_id)
    }

    /// Bus:Device part of the slot, shared by all functions of a card
    pub fn bus_device(&self) -> &str {
        self.slot.rsplit_once('.').map(|(bd, _)| bd).unwrap_or(self.slot.as_str())
    }

    pub fn bus(&self) -> &str {
        let mut parts = self.slot.rsplit(':');
        parts.next();
        parts.next().unwrap_or_default()
    }

    /// PCI base class 0x03 is "display controller"
    pub fn is_display(&self) -> bool {
        self.class_code.starts_with("03")
    }

    /// libvirt node device name, e.g. `pci_0000_01_00_0`
    pub fn libvirt_name(&self) -> String {
        let slot = if self.slot.matches(':').count() == 1 {
            format!("0000:{}", self.slot)
        } else {
            self.slot.clone()
        };
        format!("pci_{}", slot.replace([':', '.'], "_"))
    }
}

/// A discrete card selected for passthrough with all of its functions
#[derive(Debug, Clone, Serialize)]
pub struct PassthroughGpu {
    pub vendor: GpuVendor,
    pub name: String,
    pub functions: Vec<PciFunction>,
}

impl PassthroughGpu {
    pub fn ids(&self) -> Vec<String> {
        self.functions.iter().map(PciFunction::id).collect()
    }
}

/// vfio-pci id list for all selected cards, without duplicates
pub fn gpu_ids(gpus: &[PassthroughGpu]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in gpus.iter().flat_map(PassthroughGpu::ids) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
