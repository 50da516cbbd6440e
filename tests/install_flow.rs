use std::collections::VecDeque;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use tempfile::TempDir;

use exliar_install::core::command::{DryRunExecutor, Executor, Invocation};
use exliar_install::core::config::InstallSettings;
use exliar_install::core::installer::Installer;
use exliar_install::core::state::{Change, InstallStage};
use exliar_install::error::{InstallError, Result};
use exliar_install::ui::prompt::Prompter;

const LSCPU_INTEL: &str = "Architecture:            x86_64\nVendor ID:               GenuineIntel\n";
const LSCPU_AMD: &str = "Architecture:            x86_64\nVendor ID:               AuthenticAMD\n";
const LSCPU_HYGON: &str = "Architecture:            x86_64\nVendor ID:               HygonGenuine\n";

const CPUINFO_INTEL: &str = "vendor_id\t: GenuineIntel\nflags\t\t: fpu vme vmx sse\n";
const CPUINFO_AMD: &str = "vendor_id\t: AuthenticAMD\nflags\t\t: fpu vme svm sse\n";
const CPUINFO_HYGON: &str = "vendor_id\t: HygonGenuine\nflags\t\t: fpu vme svm sse\n";

const LSPCI: &str = "\
00:00.0 Host bridge [0600]: Intel Corporation Host Bridge/DRAM Registers [8086:4668] (rev 02)
00:02.0 VGA compatible controller [0300]: Intel Corporation AlderLake-S GT1 [8086:4680] (rev 0c)
01:00.0 VGA compatible controller [0300]: NVIDIA Corporation GA104 [GeForce RTX 3060 Ti] [10de:2486] (rev a1)
01:00.1 Audio device [0403]: NVIDIA Corporation GA104 High Definition Audio Controller [10de:228b] (rev a1)
";
const LSPCI_INTEGRATED_ONLY: &str =
    "00:02.0 VGA compatible controller [0300]: Intel Corporation UHD Graphics 630 [8086:3e92]\n";

const LSBLK: &str = "/dev/nvme0n1 1.8T disk\n/dev/loop0 795.3M loop\n";
const GENFSTAB: &str = "UUID=1234-abcd / ext4 rw,relatime 0 1\n";

const DEFAULT_GRUB: &str = "GRUB_DEFAULT=0\nGRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet\"\nGRUB_CMDLINE_LINUX=\"\"\n";
const MKINITCPIO_CONF: &str = "MODULES=()\nBINARIES=()\nHOOKS=(base udev autodetect modconf block filesystems fsck)\n";
const LOCALE_GEN: &str = "#de_DE.UTF-8 UTF-8\n#en_US.UTF-8 UTF-8\n#en_US ISO-8859-1\n";

/// Records invocations and answers probes from canned output
struct RecordingExecutor {
    lscpu: &'static str,
    lspci: &'static str,
    /// Fails the first invocation whose command line contains this text
    fail_on: Option<&'static str>,
    invocations: Vec<Invocation>,
}

impl RecordingExecutor {
    fn new(lscpu: &'static str, lspci: &'static str) -> Self {
        Self { lscpu, lspci, fail_on: None, invocations: Vec::new() }
    }

    fn respond(&mut self, invocation: &Invocation, context: &'static str) -> Result<String> {
        self.invocations.push(invocation.clone());
        let program = if invocation.program == "arch-chroot" {
            invocation.args.get(1).map(String::as_str).unwrap_or_default()
        } else {
            invocation.program.as_str()
        };

        if self.fail_on.map_or(false, |needle| invocation.to_string().contains(needle)) {
            return Err(InstallError::CommandFailed {
                context,
                command: invocation.to_string(),
                status: ExitStatus::from_raw(1 << 8),
            });
        }
        Ok(match program {
            "lscpu" => self.lscpu,
            "lspci" => self.lspci,
            "lsblk" => LSBLK,
            "genfstab" => GENFSTAB,
            _ => "",
        }
        .to_string())
    }

    fn mutating(&self) -> Vec<String> {
        self.invocations.iter().filter(|i| i.is_mutating()).map(|i| i.to_string()).collect()
    }

    fn position(&self, needle: &str) -> usize {
        self.invocations
            .iter()
            .position(|i| i.to_string().contains(needle))
            .unwrap_or_else(|| panic!("{} was never invoked", needle))
    }

    fn find(&self, needle: &str) -> &Invocation {
        &self.invocations[self.position(needle)]
    }
}

impl Executor for RecordingExecutor {
    fn run(&mut self, invocation: &Invocation, context: &'static str) -> Result<()> {
        self.respond(invocation, context).map(|_| ())
    }

    fn output(&mut self, invocation: &Invocation, context: &'static str) -> Result<String> {
        self.respond(invocation, context)
    }
}

struct ScriptedPrompter {
    answers: VecDeque<&'static str>,
    asked: usize,
}

impl ScriptedPrompter {
    fn new(answers: &[&'static str]) -> Self {
        Self { answers: answers.iter().copied().collect(), asked: 0 }
    }

    fn operator() -> Self {
        Self::new(&["/dev/nvme0n1", "yes", "rootpw", "rootpw", "alice", "alicepw", "alicepw"])
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, _question: &str) -> Result<String> {
        self.asked += 1;
        self.answers.pop_front().map(String::from).ok_or(InstallError::Cancelled)
    }

    fn ask_secret(&mut self, question: &str) -> Result<String> {
        self.ask(question)
    }
}

/// A temporary live environment: efivars directory and a pre-seeded target root
struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    efivars: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("mnt");
        let efivars = dir.path().join("efivars");
        fs::create_dir_all(&efivars).unwrap();

        // Files pacstrap would have installed
        fs::create_dir_all(root.join("etc/default")).unwrap();
        fs::write(root.join("etc/default/grub"), DEFAULT_GRUB).unwrap();
        fs::write(root.join("etc/mkinitcpio.conf"), MKINITCPIO_CONF).unwrap();
        fs::write(root.join("etc/locale.gen"), LOCALE_GEN).unwrap();

        Self { _dir: dir, root, efivars }
    }

    fn installer(&self, executor: RecordingExecutor, cpuinfo: &str) -> Installer<RecordingExecutor> {
        let settings = InstallSettings { mount_point: self.root.clone(), ..InstallSettings::default() };
        Installer::new(settings, executor, false).with_host_probes(cpuinfo, self.efivars.clone())
    }

    fn read(&self, target_path: &str) -> String {
        fs::read_to_string(self.root.join(target_path.trim_start_matches('/'))).unwrap()
    }

    fn exists(&self, target_path: &str) -> bool {
        self.root.join(target_path.trim_start_matches('/')).exists()
    }
}

fn backups_of(path: &Path) -> usize {
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&format!("{}.backup_", name)))
        .count()
}

#[test]
fn intel_install_runs_to_completion() {
    let fixture = Fixture::new();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_INTEL, LSPCI), CPUINFO_INTEL);
    let mut prompter = ScriptedPrompter::operator();

    installer.run(&mut prompter).unwrap();
    assert_eq!(installer.journal().stage(), InstallStage::Done);

    let grub = fixture.read("/etc/default/grub");
    assert!(grub.contains(
        "GRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet intel_iommu=on iommu=pt vfio-pci.ids=10de:2486,10de:228b\""
    ));
    assert!(grub.contains("GRUB_CMDLINE_LINUX=\"\"\n"));
    assert_eq!(backups_of(&fixture.root.join("etc/default/grub")), 1);

    let mkinitcpio = fixture.read("/etc/mkinitcpio.conf");
    assert!(mkinitcpio.starts_with("MODULES=(vfio vfio_iommu_type1 vfio_pci vfio_virqfd intel_agp i915)\n"));
    assert!(mkinitcpio.contains("HOOKS=(base udev autodetect modconf block filesystems fsck)"));

    assert!(fixture
        .read("/etc/modprobe.d/vfio.conf")
        .starts_with("options vfio-pci ids=10de:2486,10de:228b disable_vga=1"));
    assert!(fixture.read("/etc/locale.gen").contains("\nen_US.UTF-8 UTF-8\n"));
    assert_eq!(fixture.read("/etc/locale.conf"), "LANG=en_US.UTF-8\n");
    assert_eq!(fixture.read("/etc/hostname"), "archvfio\n");
    assert_eq!(fixture.read("/etc/fstab"), GENFSTAB);
    assert!(fixture.read("/etc/sudoers.d/10-wheel").contains("%wheel"));
    assert!(fixture.exists("/home/alice/gpu-detach.sh"));
    assert!(fixture.exists("/home/alice/gpu-reattach.sh"));
    assert!(fixture.read("/etc/libvirt/hooks/qemu").contains("/home/alice/gpu-detach.sh"));

    let executor = installer.executor();
    let pacstrap = executor.find("pacstrap");
    assert!(pacstrap.args.contains(&"intel-ucode".to_string()));
    assert!(pacstrap.args.contains(&"vulkan-intel".to_string()));
    assert!(!pacstrap.args.contains(&"amd-ucode".to_string()));

    assert!(executor.position("mklabel gpt") < executor.position("mkfs.fat -F32 /dev/nvme0n1p1"));
    assert!(executor.position("mkfs.ext4 -F /dev/nvme0n1p2") < executor.position("pacstrap"));
    assert!(executor.position("pacstrap") < executor.position("mkinitcpio -P"));
    assert!(executor.position("mkinitcpio -P") < executor.position("grub-mkconfig"));
    assert!(executor.position("grub-install") < executor.position("grub-mkconfig"));
    assert_eq!(executor.invocations.last().unwrap().to_string(), format!("umount -R {}", fixture.root.display()));
}

#[test]
fn passwords_only_travel_on_stdin() {
    let fixture = Fixture::new();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_INTEL, LSPCI), CPUINFO_INTEL);
    installer.run(&mut ScriptedPrompter::operator()).unwrap();

    let stdins: Vec<&str> = installer
        .executor()
        .invocations
        .iter()
        .filter_map(|i| i.stdin.as_deref())
        .collect();
    assert_eq!(stdins, vec!["root:rootpw\n", "alice:alicepw\n"]);

    for change in installer.journal().changes() {
        if let Change::CommandRun { command } = change {
            assert!(!command.contains("rootpw"));
            assert!(!command.contains("alicepw"));
        }
    }
}

#[test]
fn amd_host_gets_the_amd_profile() {
    let fixture = Fixture::new();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_AMD, LSPCI), CPUINFO_AMD);
    installer.run(&mut ScriptedPrompter::operator()).unwrap();

    let grub = fixture.read("/etc/default/grub");
    assert!(grub.contains("quiet amd_iommu=on iommu=pt vfio-pci.ids=10de:2486,10de:228b\""));
    assert!(!grub.contains("intel_iommu"));
    assert!(fixture
        .read("/etc/mkinitcpio.conf")
        .starts_with("MODULES=(vfio vfio_iommu_type1 vfio_pci vfio_virqfd amdgpu)\n"));

    let pacstrap = installer.executor().find("pacstrap");
    assert!(pacstrap.args.contains(&"amd-ucode".to_string()));
    assert!(pacstrap.args.contains(&"xf86-video-amdgpu".to_string()));
    assert!(!pacstrap.args.contains(&"intel-ucode".to_string()));
}

#[test]
fn unknown_vendor_aborts_before_any_disk_command() {
    let fixture = Fixture::new();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_HYGON, LSPCI), CPUINFO_HYGON);
    let mut prompter = ScriptedPrompter::operator();

    let err = installer.run(&mut prompter).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedCpu));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(prompter.asked, 0);
    assert!(installer.executor().mutating().is_empty());
    assert_eq!(installer.journal().stage(), InstallStage::VendorDetected);
    assert!(installer.journal().cleanup_hints().is_empty());
    assert_eq!(fixture.read("/etc/default/grub"), DEFAULT_GRUB);
}

#[test]
fn bios_boot_aborts_before_any_disk_command() {
    let fixture = Fixture::new();
    fs::remove_dir(&fixture.efivars).unwrap();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_INTEL, LSPCI), CPUINFO_INTEL);

    let err = installer.run(&mut ScriptedPrompter::operator()).unwrap_err();
    assert!(matches!(err, InstallError::NotUefi(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(installer.executor().mutating().is_empty());
}

#[test]
fn missing_passthrough_gpu_aborts_before_any_disk_command() {
    let fixture = Fixture::new();
    let mut installer =
        fixture.installer(RecordingExecutor::new(LSCPU_INTEL, LSPCI_INTEGRATED_ONLY), CPUINFO_INTEL);
    let mut prompter = ScriptedPrompter::operator();

    let err = installer.run(&mut prompter).unwrap_err();
    assert!(matches!(err, InstallError::NoPassthroughGpu));
    assert_eq!(prompter.asked, 0);
    assert!(installer.executor().mutating().is_empty());
}

#[test]
fn declined_wipe_leaves_the_disk_alone() {
    let fixture = Fixture::new();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_INTEL, LSPCI), CPUINFO_INTEL);

    let err = installer.run(&mut ScriptedPrompter::new(&["/dev/nvme0n1", "no"])).unwrap_err();
    assert!(matches!(err, InstallError::Cancelled));
    assert!(installer.executor().mutating().is_empty());
    assert!(!installer.journal().stage().disk_touched());
}

#[test]
fn failed_tool_stops_the_run_and_leaves_cleanup_hints() {
    let fixture = Fixture::new();
    let mut executor = RecordingExecutor::new(LSCPU_INTEL, LSPCI);
    executor.fail_on = Some("pacstrap");
    let mut installer = fixture.installer(executor, CPUINFO_INTEL);

    let err = installer.run(&mut ScriptedPrompter::operator()).unwrap_err();
    assert!(matches!(err, InstallError::CommandFailed { context: "Installing packages", .. }));
    assert_eq!(installer.journal().stage(), InstallStage::Mounted);
    assert_eq!(installer.executor().invocations.last().unwrap().program, "pacstrap");

    let hints = installer.journal().cleanup_hints();
    assert!(hints.iter().any(|h| h.contains(&format!("umount -R {}", fixture.root.display()))));
    assert_eq!(fixture.read("/etc/default/grub"), DEFAULT_GRUB);
}

#[test]
fn journal_is_saved_as_json() {
    let fixture = Fixture::new();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_INTEL, LSPCI), CPUINFO_INTEL);
    installer.run(&mut ScriptedPrompter::operator()).unwrap();

    let path = fixture.root.join("journal.json");
    installer.journal().save(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["stage"], "Done");
    assert_eq!(json["stages"].as_array().unwrap().len(), 11);
}

#[test]
fn preflight_plan_needs_no_answers() {
    let fixture = Fixture::new();
    let mut installer = fixture.installer(RecordingExecutor::new(LSCPU_AMD, LSPCI), CPUINFO_AMD);

    let plan = installer.preflight().unwrap();
    assert_eq!(plan.profile.iommu_flag, "amd_iommu=on");
    assert_eq!(plan.gpu_ids, vec!["10de:2486", "10de:228b"]);
    assert!(installer.executor().mutating().is_empty());
}

#[test]
fn failed_efi_mount_still_reports_the_mounted_root() {
    let fixture = Fixture::new();
    let mut executor = RecordingExecutor::new(LSCPU_INTEL, LSPCI);
    executor.fail_on = Some("mount /dev/nvme0n1p1");
    let mut installer = fixture.installer(executor, CPUINFO_INTEL);

    let err = installer.run(&mut ScriptedPrompter::operator()).unwrap_err();
    assert!(matches!(err, InstallError::CommandFailed { context: "Mounting the EFI partition", .. }));
    assert_eq!(installer.journal().stage(), InstallStage::Formatted);
    assert_eq!(installer.journal().active_mounts(), vec![fixture.root.as_path()]);

    let hints = installer.journal().cleanup_hints();
    assert!(hints.iter().any(|h| h.contains(&format!("umount -R {}", fixture.root.display()))));
}

#[test]
fn dry_run_leaves_the_target_untouched() {
    let fixture = Fixture::new();
    let settings = InstallSettings { mount_point: fixture.root.clone(), ..InstallSettings::default() };
    let executor = DryRunExecutor::new(RecordingExecutor::new(LSCPU_INTEL, LSPCI));
    let mut installer =
        Installer::new(settings, executor, true).with_host_probes(CPUINFO_INTEL, fixture.efivars.clone());

    installer.run(&mut ScriptedPrompter::operator()).unwrap();
    assert_eq!(installer.journal().stage(), InstallStage::Done);

    // Only probes reach the real executor
    let recorded = installer.executor().inner();
    assert!(recorded.mutating().is_empty());
    assert!(recorded.invocations.iter().any(|i| i.program == "lspci"));

    assert_eq!(fixture.read("/etc/default/grub"), DEFAULT_GRUB);
    assert_eq!(fixture.read("/etc/mkinitcpio.conf"), MKINITCPIO_CONF);
    assert_eq!(fixture.read("/etc/locale.gen"), LOCALE_GEN);
    assert_eq!(backups_of(&fixture.root.join("etc/default/grub")), 0);
    assert!(!fixture.exists("/home/alice"));
    assert!(!fixture.exists("/etc/fstab"));
    assert!(!fixture.exists("/etc/modprobe.d/vfio.conf"));
    assert!(!fixture.exists("/boot/efi"));
}
