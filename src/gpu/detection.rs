// GPU detection for the Exliar installer
//
// Scans `lspci -nn` for display controllers that can be passed through and
// collects every function that sits on the same card (HDMI audio, USB-C
// controllers), since vfio-pci must claim all of them.

use log::{debug, info};
use regex::Regex;

use crate::core::command::{Executor, Invocation};
use crate::error::{InstallError, Result};
use crate::gpu::{GpuVendor, PassthroughGpu, PciFunction};

/// Bus of the host bridge; GPUs there are integrated into the CPU/chipset
const HOST_BUS: &str = "00";

/// Detects discrete GPUs for passthrough
pub fn detect_passthrough_gpus(executor: &mut dyn Executor) -> Result<Vec<PassthroughGpu>> {
    let output = executor.output(&Invocation::probe("lspci").arg("-nn"), "Listing PCI devices")?;
    let functions = parse_lspci(&output)?;
    debug!("Found {} PCI functions", functions.len());

    let gpus = select_passthrough_gpus(&functions);
    for gpu in &gpus {
        info!("Passthrough GPU: {} ({}) [{}]", gpu.name, gpu.vendor, gpu.ids().join(","));
    }
    Ok(gpus)
}

/// Parses `lspci -nn` output, skipping lines without vendor:device ids
pub fn parse_lspci(output: &str) -> Result<Vec<PciFunction>> {
    let re = Regex::new(
        r"^(?P<slot>\S+)\s+.+?\s+\[(?P<class>[0-9a-fA-F]{4})\]:\s+(?P<desc>.*?)\s+\[(?P<vendor>[0-9a-fA-F]{4}):(?P<device>[0-9a-fA-F]{4})\]",
    )
    .map_err(|e| InstallError::InvalidInput(format!("Regex error: {}", e)))?;

    Ok(output
        .lines()
        .filter_map(|line| re.captures(line.trim()))
        .map(|caps| PciFunction {
            slot: caps["slot"].to_string(),
            class_code: caps["class"].to_lowercase(),
            description: caps["desc"].to_string(),
            vendor_id: caps["vendor"].to_lowercase(),
            device_id: caps["device"].to_lowercase(),
        })
        .collect())
}

/// Picks display controllers off the host bus, each with its sibling functions
pub fn select_passthrough_gpus(functions: &[PciFunction]) -> Vec<PassthroughGpu> {
    let mut gpus: Vec<PassthroughGpu> = Vec::new();

    for display in functions.iter().filter(|f| f.is_display() && f.bus() != HOST_BUS) {
        if gpus
            .iter()
            .any(|g| g.functions.iter().any(|f| f.bus_device() == display.bus_device()))
        {
            continue;
        }

        let card_functions: Vec<PciFunction> = functions
            .iter()
            .filter(|f| f.bus_device() == display.bus_device())
            .cloned()
            .collect();

        gpus.push(PassthroughGpu {
            vendor: GpuVendor::from_vendor_id(&display.vendor_id),
            name: display.description.clone(),
            functions: card_functions,
        });
    }

    gpus
}
