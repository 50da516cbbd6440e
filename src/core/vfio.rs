// VFIO configuration for the installed system
//
// This module renders the files that hand the passthrough GPU to vfio-pci:
// the modprobe options, the helper scripts placed in the user's home and the
// libvirt hook that calls them around VM start and shutdown.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::config::UserAccount;
use crate::gpu::{GpuVendor, PassthroughGpu};

pub const MODPROBE_CONF: &str = "/etc/modprobe.d/vfio.conf";
pub const LIBVIRT_HOOK: &str = "/etc/libvirt/hooks/qemu";
pub const DETACH_SCRIPT: &str = "gpu-detach.sh";
pub const REATTACH_SCRIPT: &str = "gpu-reattach.sh";

/// Rendered VFIO files, keyed by their path inside the target
#[derive(Debug, Clone, Serialize)]
pub struct VfioArtifacts {
    pub detach_script: String,
    pub reattach_script: String,
    pub libvirt_hook: String,
    pub detach_path: PathBuf,
    pub reattach_path: PathBuf,
}

impl VfioArtifacts {
    pub fn render(gpus: &[PassthroughGpu], user: &UserAccount) -> Self {
        let detach_path = user.home().join(DETACH_SCRIPT);
        let reattach_path = user.home().join(REATTACH_SCRIPT);

        Self {
            detach_script: detach_script(gpus),
            reattach_script: reattach_script(gpus),
            libvirt_hook: libvirt_hook(&detach_path, &reattach_path),
            detach_path,
            reattach_path,
        }
    }
}

/// Host drivers that would grab a card of this vendor before vfio-pci
fn competing_drivers(vendor: &GpuVendor) -> &'static [&'static str] {
    match vendor {
        GpuVendor::NVIDIA => &["nouveau", "nvidia"],
        GpuVendor::AMD => &["amdgpu", "radeon"],
        GpuVendor::Intel => &["i915", "xe"],
        GpuVendor::Other(_) => &[],
    }
}

/// Contents of /etc/modprobe.d/vfio.conf
pub fn modprobe_conf(gpus: &[PassthroughGpu], gpu_ids: &[String]) -> String {
    // disable_vga=1 keeps vfio-pci off the VGA arbiter of the boot display
    let mut lines = vec![format!("options vfio-pci ids={} disable_vga=1", gpu_ids.join(","))];

    // Soft dependencies make vfio-pci load before the graphics drivers
    let mut drivers = vec!["drm"];
    for driver in gpus.iter().flat_map(|g| competing_drivers(&g.vendor).iter().copied()) {
        if !drivers.contains(&driver) {
            drivers.push(driver);
        }
    }
    lines.extend(drivers.iter().map(|d| format!("softdep {} pre: vfio-pci", d)));

    lines.join("\n") + "\n"
}

fn node_devices(gpus: &[PassthroughGpu]) -> Vec<String> {
    gpus.iter()
        .flat_map(|g| g.functions.iter().map(|f| f.libvirt_name()))
        .collect()
}

pub fn detach_script(gpus: &[PassthroughGpu]) -> String {
    let mut script = String::from("#!/bin/bash\n# Hand the passthrough GPU to vfio-pci\nset -e\n\n");
    for device in node_devices(gpus) {
        script.push_str(&format!("virsh nodedev-detach {}\n", device));
    }
    script
}

/// Reattaches in reverse order so the display function comes back last
pub fn reattach_script(gpus: &[PassthroughGpu]) -> String {
    let mut script = String::from("#!/bin/bash\n# Give the passthrough GPU back to the host\nset -e\n\n");
    for device in node_devices(gpus).iter().rev() {
        script.push_str(&format!("virsh nodedev-reattach {}\n", device));
    }
    script
}

pub fn libvirt_hook(detach: &std::path::Path, reattach: &std::path::Path) -> String {
    format!(
        r#"#!/bin/bash
# libvirt qemu hook: $1 guest, $2 operation, $3 sub-operation
OPERATION="$2"
SUB_OPERATION="$3"

case "$OPERATION/$SUB_OPERATION" in
    prepare/begin)
        {detach}
        ;;
    release/end)
        {reattach}
        ;;
esac
"#,
        detach = detach.display(),
        reattach = reattach.display(),
    )
}
