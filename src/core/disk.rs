// Target disk handling
//
// Layout is fixed: a GPT label, a FAT32 EFI system partition and an ext4 root
// filesystem taking the rest of the disk.

use std::ops::RangeInclusive;

use log::info;
use serde::Serialize;

use crate::core::bootloader::grub::EFI_DIRECTORY;
use crate::core::command::{Executor, Invocation};
use crate::core::state::Change;
use crate::core::target::TargetRoot;
use crate::error::{InstallError, Result};

/// Accepted sizes of the EFI system partition
pub const EFI_SIZE_MIB: RangeInclusive<u32> = 100..=8192;

/// A whole disk as reported by lsblk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskInfo {
    pub path: String,
    pub size: String,
}

/// Lists whole disks (no partitions, no loop or rom devices)
pub fn list_disks(executor: &mut dyn Executor) -> Result<Vec<DiskInfo>> {
    let output = executor.output(
        &Invocation::probe("lsblk").args(["-dpno", "NAME,SIZE,TYPE"]),
        "Listing block devices",
    )?;
    Ok(parse_lsblk(&output))
}

pub fn parse_lsblk(output: &str) -> Vec<DiskInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [path, size, "disk"] => Some(DiskInfo {
                    path: path.to_string(),
                    size: size.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Device node of partition `index` on `disk`.
///
/// Disks whose name ends in a digit (nvme0n1, mmcblk0) use a `p` separator.
pub fn partition_path(disk: &str, index: u8) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk, index)
    } else {
        format!("{}{}", disk, index)
    }
}

/// The partitions the installer creates on the selected disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskLayout {
    pub disk: String,
    pub efi_partition: String,
    pub root_partition: String,
    pub efi_size_mib: u32,
}

impl DiskLayout {
    /// Validates `disk` against the lsblk listing and the ESP size
    pub fn select(disk: &str, available: &[DiskInfo], efi_size_mib: u32) -> Result<Self> {
        if !EFI_SIZE_MIB.contains(&efi_size_mib) {
            return Err(InstallError::InvalidInput(format!(
                "EFI partition of {} MiB is outside {}..={} MiB",
                efi_size_mib,
                EFI_SIZE_MIB.start(),
                EFI_SIZE_MIB.end()
            )));
        }
        let disk = disk.trim();
        if !disk.starts_with("/dev/") || !available.iter().any(|d| d.path == disk) {
            return Err(InstallError::InvalidDisk(disk.to_string()));
        }
        Ok(Self {
            disk: disk.to_string(),
            efi_partition: partition_path(disk, 1),
            root_partition: partition_path(disk, 2),
            efi_size_mib,
        })
    }

    fn parted(&self, args: &[&str]) -> Invocation {
        Invocation::mutating("parted").arg("-s").arg(self.disk.as_str()).args(args.iter().copied())
    }

    /// Wipes the partition table and creates the EFI and root partitions
    pub fn partition(&self, executor: &mut dyn Executor) -> Result<()> {
        info!("Partitioning {}", self.disk);
        let efi_end = format!("{}MiB", self.efi_size_mib + 1);

        executor.run(&self.parted(&["mklabel", "gpt"]), "Creating the partition table")?;
        executor.run(
            &self.parted(&["mkpart", "ESP", "fat32", "1MiB", &efi_end]),
            "Creating the EFI partition",
        )?;
        executor.run(&self.parted(&["set", "1", "esp", "on"]), "Flagging the EFI partition")?;
        executor.run(
            &self.parted(&["mkpart", "root", "ext4", &efi_end, "100%"]),
            "Creating the root partition",
        )?;
        Ok(())
    }

    pub fn format(&self, executor: &mut dyn Executor) -> Result<()> {
        info!("Formatting filesystems");
        executor.run(
            &Invocation::mutating("mkfs.fat").arg("-F32").arg(self.efi_partition.as_str()),
            "Formatting the EFI partition",
        )?;
        executor.run(
            &Invocation::mutating("mkfs.ext4").arg("-F").arg(self.root_partition.as_str()),
            "Formatting the root partition",
        )?;
        Ok(())
    }

    /// Mounts the root filesystem at the target root
    pub fn mount_root(&self, executor: &mut dyn Executor, target: &TargetRoot) -> Result<Change> {
        let root = target.root().to_path_buf();
        info!("Mounting filesystems to {}", root.display());

        executor.run(
            &Invocation::mutating("mount")
                .arg(self.root_partition.as_str())
                .arg(root.to_string_lossy()),
            "Mounting the root filesystem",
        )?;
        Ok(Change::Mounted { device: self.root_partition.clone(), target: root })
    }

    /// Mounts the ESP below the already mounted root
    pub fn mount_efi(&self, executor: &mut dyn Executor, target: &TargetRoot) -> Result<Change> {
        target.create_dir(EFI_DIRECTORY)?;
        let efi = target.path(EFI_DIRECTORY);
        executor.run(
            &Invocation::mutating("mount")
                .arg(self.efi_partition.as_str())
                .arg(efi.to_string_lossy()),
            "Mounting the EFI partition",
        )?;
        Ok(Change::Mounted { device: self.efi_partition.clone(), target: efi })
    }
}

/// Recursively unmounts everything below the target root
pub fn unmount_all(executor: &mut dyn Executor, target: &TargetRoot) -> Result<Change> {
    let root = target.root().to_path_buf();
    info!("Unmounting filesystems");
    executor.run(
        &Invocation::mutating("umount").arg("-R").arg(root.to_string_lossy()),
        "Unmounting filesystems",
    )?;
    Ok(Change::Unmounted { target: root })
}
