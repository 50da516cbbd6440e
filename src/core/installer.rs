// Installation orchestration
//
// `Installer` drives the whole run: pre-flight checks, operator questions,
// then one tool invocation after another while the journal follows the
// stage order. Nothing is retried; the first error ends the run.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::core::bootloader::{BootloaderManager, GrubConfig};
use crate::core::command::{Executor, Invocation};
use crate::core::config::{InstallAnswers, InstallSettings, UserAccount};
use crate::core::disk::{self, DiskLayout};
use crate::core::initcpio;
use crate::core::profile::VendorProfile;
use crate::core::state::{Change, InstallJournal, InstallStage};
use crate::core::system::{HostInfo, CPUINFO, EFIVARS_DIR};
use crate::core::target::{self, TargetRoot};
use crate::core::vfio::{self, VfioArtifacts};
use crate::error::{InstallError, Result};
use crate::gpu::detection::detect_passthrough_gpus;
use crate::gpu::{gpu_ids, PassthroughGpu};
use crate::ui;
use crate::ui::prompt::{self, Prompter};

/// Host tools every run needs before the first prompt
pub const REQUIRED_TOOLS: [&str; 10] = [
    "lsblk",
    "parted",
    "mkfs.fat",
    "mkfs.ext4",
    "mount",
    "umount",
    "pacstrap",
    "genfstab",
    "arch-chroot",
    "lspci",
];

pub const SUDOERS_WHEEL: &str = "/etc/sudoers.d/10-wheel";

/// Everything derived from the hardware before the operator is asked anything
#[derive(Debug, Clone, Serialize)]
pub struct InstallPlan {
    pub profile: &'static VendorProfile,
    pub gpus: Vec<PassthroughGpu>,
    pub gpu_ids: Vec<String>,
    pub packages: Vec<String>,
    pub kernel_parameters: Vec<String>,
    pub initramfs_modules: Vec<String>,
    pub modprobe_conf: String,
}

impl InstallPlan {
    pub fn new(profile: &'static VendorProfile, gpus: Vec<PassthroughGpu>, settings: &InstallSettings) -> Self {
        let ids = gpu_ids(&gpus);
        Self {
            profile,
            packages: profile.packages(&settings.extra_packages),
            kernel_parameters: profile.kernel_parameters(&ids),
            initramfs_modules: profile.kernel_modules.iter().map(|m| m.to_string()).collect(),
            modprobe_conf: vfio::modprobe_conf(&gpus, &ids),
            gpu_ids: ids,
            gpus,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            InstallError::io("Serializing the plan", std::io::Error::new(std::io::ErrorKind::Other, e))
        })
    }
}

/// Executor wrapper that records every mutating command in the journal
struct Journaled<'a> {
    inner: &'a mut dyn Executor,
    journal: &'a mut InstallJournal,
}

impl Journaled<'_> {
    fn note(&mut self, invocation: &Invocation) {
        if invocation.is_mutating() {
            self.journal.record(Change::CommandRun { command: invocation.to_string() });
        }
    }
}

impl Executor for Journaled<'_> {
    fn run(&mut self, invocation: &Invocation, context: &'static str) -> Result<()> {
        self.inner.run(invocation, context)?;
        self.note(invocation);
        Ok(())
    }

    fn output(&mut self, invocation: &Invocation, context: &'static str) -> Result<String> {
        let output = self.inner.output(invocation, context)?;
        self.note(invocation);
        Ok(output)
    }

    fn check_tool(&self, program: &str) -> Result<()> {
        self.inner.check_tool(program)
    }
}

pub struct Installer<E: Executor> {
    settings: InstallSettings,
    executor: E,
    target: TargetRoot,
    journal: InstallJournal,
    bootloader: GrubConfig,
    cpuinfo: String,
    efivars: PathBuf,
}

impl<E: Executor> Installer<E> {
    pub fn new(settings: InstallSettings, executor: E, dry_run: bool) -> Self {
        let cpuinfo = fs::read_to_string(CPUINFO).unwrap_or_default();
        Self {
            target: TargetRoot::new(settings.mount_point.clone(), dry_run),
            settings,
            executor,
            journal: InstallJournal::new(),
            bootloader: GrubConfig::new(),
            cpuinfo,
            efivars: PathBuf::from(EFIVARS_DIR),
        }
    }

    /// Replaces the /proc/cpuinfo text and the efivars directory probed
    pub fn with_host_probes(mut self, cpuinfo: impl Into<String>, efivars: impl Into<PathBuf>) -> Self {
        self.cpuinfo = cpuinfo.into();
        self.efivars = efivars.into();
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn journal(&self) -> &InstallJournal {
        &self.journal
    }

    fn exec(&mut self) -> Journaled<'_> {
        Journaled { inner: &mut self.executor, journal: &mut self.journal }
    }

    fn root(&self) -> String {
        self.settings.root()
    }

    fn record(&mut self, change: Change) {
        self.journal.record(change);
    }

    /// Checks the host and derives the plan; never touches a disk.
    ///
    /// Prints nothing on stdout, so `--print-plan` output stays plain JSON.
    pub fn preflight(&mut self) -> Result<InstallPlan> {
        let host = HostInfo::probe(&mut self.executor, &self.cpuinfo, &self.efivars);
        for line in host.summary().lines() {
            info!("{}", line);
        }
        self.journal.advance(InstallStage::VendorDetected)?;

        let profile = VendorProfile::resolve(host.cpu_vendor)?;
        if !host.uefi {
            return Err(InstallError::NotUefi(self.efivars.clone()));
        }
        if !host.virtualization_enabled {
            warn!("No svm/vmx CPU flag found; enable virtualization in the firmware setup");
        }

        let gpus = detect_passthrough_gpus(&mut self.executor)?;
        if gpus.is_empty() {
            return Err(InstallError::NoPassthroughGpu);
        }

        for tool in REQUIRED_TOOLS {
            self.executor.check_tool(tool)?;
        }

        let plan = InstallPlan::new(profile, gpus, &self.settings);
        info!("vfio-pci ids: {}", plan.gpu_ids.join(","));
        Ok(plan)
    }

    /// Full interactive installation
    pub fn run(&mut self, prompter: &mut dyn Prompter) -> Result<()> {
        ui::banner("Pre-flight checks");
        let plan = self.preflight()?;

        ui::banner("Installation settings");
        let disks = disk::list_disks(&mut self.executor)?;
        let answers = prompt::ask_answers(prompter, &disks)?;
        let layout = DiskLayout::select(&answers.disk, &disks, self.settings.efi_size_mib)?;
        self.journal.advance(InstallStage::DiskSelected)?;

        self.prepare_disk(&layout)?;
        self.install_base(&plan)?;
        self.configure(&plan)?;
        self.create_user(&plan, &answers)?;
        self.finish()
    }

    fn prepare_disk(&mut self, layout: &DiskLayout) -> Result<()> {
        ui::banner(&format!("Preparing {}", layout.disk));

        layout.partition(&mut self.exec())?;
        self.journal.advance(InstallStage::Partitioned)?;

        layout.format(&mut self.exec())?;
        self.journal.advance(InstallStage::Formatted)?;

        // Each mount is journaled as soon as it exists
        let mut exec = Journaled { inner: &mut self.executor, journal: &mut self.journal };
        let change = layout.mount_root(&mut exec, &self.target)?;
        self.record(change);

        let mut exec = Journaled { inner: &mut self.executor, journal: &mut self.journal };
        let change = layout.mount_efi(&mut exec, &self.target)?;
        self.record(change);

        self.journal.advance(InstallStage::Mounted)
    }

    fn install_base(&mut self, plan: &InstallPlan) -> Result<()> {
        ui::banner("Installing base system");
        let root = self.root();

        info!("Installing {} packages", plan.packages.len());
        let pacstrap = Invocation::mutating("pacstrap").arg("-K").arg(root.as_str()).args(&plan.packages);
        self.exec().run(&pacstrap, "Installing packages")?;

        let genfstab = Invocation::mutating("genfstab").arg("-U").arg(root.as_str());
        let fstab = self.exec().output(&genfstab, "Generating fstab")?;
        let change = self.target.append("/etc/fstab", &fstab)?;
        self.record(change);

        self.journal.advance(InstallStage::BaseInstalled)
    }

    fn configure(&mut self, plan: &InstallPlan) -> Result<()> {
        ui::banner("Configuring system");
        let root = self.root();

        let zone = format!("/usr/share/zoneinfo/{}", self.settings.timezone);
        let link = Invocation::chroot(&root, &["ln", "-sf", &zone, "/etc/localtime"]);
        self.exec().run(&link, "Setting the timezone")?;
        self.exec().run(&Invocation::chroot(&root, &["hwclock", "--systohc"]), "Setting the hardware clock")?;

        let locale = self.settings.locale.clone();
        let change = self.target.edit("/etc/locale.gen", |content| Ok(target::enable_locale(content, &locale)))?;
        self.record(change);
        self.exec().run(&Invocation::chroot(&root, &["locale-gen"]), "Generating locales")?;

        let files = [
            ("/etc/locale.conf", target::locale_conf(&self.settings)),
            ("/etc/vconsole.conf", target::vconsole_conf(&self.settings)),
            ("/etc/hostname", target::hostname_file(&self.settings)),
            ("/etc/hosts", target::hosts_file(&self.settings)),
            (vfio::MODPROBE_CONF, plan.modprobe_conf.clone()),
        ];
        for (path, content) in files {
            let change = self.target.write(path, &content)?;
            self.record(change);
        }

        // Both edits have to land before the initramfs and grub.cfg are generated
        let change = initcpio::configure_modules(&self.target, plan.profile.kernel_modules)?;
        self.record(change);
        let change = self.bootloader.add_parameters(&self.target, &plan.kernel_parameters)?;
        self.record(change);
        if let Ok(params) = self.bootloader.get_config_parameters(&self.target) {
            debug!("Kernel command line: {}", params.join(" "));
        }

        let bootloader = self.bootloader.clone();
        initcpio::regenerate(&mut self.exec(), &root)?;
        bootloader.install(&mut self.exec(), &root)?;
        bootloader.update_bootloader(&mut self.exec(), &root)?;

        let enable = Invocation::chroot(&root, &["systemctl", "enable"]).args(&self.settings.services);
        self.exec().run(&enable, "Enabling services")?;

        self.journal.advance(InstallStage::Configured)
    }

    fn create_user(&mut self, plan: &InstallPlan, answers: &InstallAnswers) -> Result<()> {
        let user = &answers.user;
        ui::banner(&format!("Creating user {}", user.name));
        let root = self.root();

        self.set_password(&root, "root", &answers.root_password)?;

        let groups = self.settings.user_groups.join(",");
        let useradd = Invocation::chroot(&root, &["useradd", "-m", "-G", &groups, "-s", "/bin/bash", &user.name]);
        self.exec().run(&useradd, "Creating the user")?;
        self.set_password(&root, &user.name, &user.password)?;

        let usermod = Invocation::chroot(&root, &["usermod", "-aG", "libvirt,kvm", &user.name]);
        self.exec().run(&usermod, "Adding the user to the libvirt and kvm groups")?;

        let change = self.target.write(SUDOERS_WHEEL, target::sudoers_wheel())?;
        self.record(change);

        self.install_vfio_helpers(plan, user)?;
        self.journal.advance(InstallStage::UserCreated)
    }

    fn set_password(&mut self, root: &str, account: &str, password: &str) -> Result<()> {
        info!("Setting password for {}", account);
        let chpasswd = Invocation::chroot(root, &["chpasswd"]).stdin(format!("{}:{}\n", account, password));
        self.exec().run(&chpasswd, "Setting a password")
    }

    fn install_vfio_helpers(&mut self, plan: &InstallPlan, user: &UserAccount) -> Result<()> {
        let artifacts = VfioArtifacts::render(&plan.gpus, user);
        let scripts = [
            (artifacts.detach_path.as_path(), artifacts.detach_script.as_str()),
            (artifacts.reattach_path.as_path(), artifacts.reattach_script.as_str()),
            (Path::new(vfio::LIBVIRT_HOOK), artifacts.libvirt_hook.as_str()),
        ];
        for (path, content) in scripts {
            let change = self.target.write_executable(path, content)?;
            self.record(change);
        }

        let owner = format!("{0}:{0}", user.name);
        let chown = Invocation::chroot(&self.root(), &["chown", &owner])
            .arg(artifacts.detach_path.to_string_lossy())
            .arg(artifacts.reattach_path.to_string_lossy());
        self.exec().run(&chown, "Handing the helper scripts to the user")
    }

    fn finish(&mut self) -> Result<()> {
        ui::banner("Finishing");
        let mut exec = Journaled { inner: &mut self.executor, journal: &mut self.journal };
        let change = disk::unmount_all(&mut exec, &self.target)?;
        self.record(change);
        self.journal.advance(InstallStage::Unmounted)?;
        self.journal.advance(InstallStage::Done)?;

        ui::success("Installation complete. Remove the installation medium and reboot.");
        Ok(())
    }
}
