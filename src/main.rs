use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use exliar_install::core::command::{DryRunExecutor, Executor, SystemExecutor};
use exliar_install::core::config::InstallSettings;
use exliar_install::core::installer::Installer;
use exliar_install::error::Result;
use exliar_install::ui::{self, prompt::TerminalPrompter};
use exliar_install::utils;

/// Installs Arch Linux prepared for VFIO GPU passthrough
#[derive(Parser, Debug)]
#[command(name = "exliar-install", version, about)]
struct Args {
    /// JSON file overriding the default installation settings
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print every mutating command instead of running it
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,

    /// Run the pre-flight checks, print the resulting plan as JSON and exit
    #[arg(long)]
    print_plan: bool,

    /// Write the installation journal to this file when the run ends
    #[arg(long, value_name = "FILE")]
    journal: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    utils::init_logger(args.verbose, utils::log_mode(args.print_plan));

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            ui::failure(&err.to_string());
            std::process::exit(err.exit_code());
        }
    };

    let executor: Box<dyn Executor> = if args.dry_run {
        info!("Dry run: no disk or file on the target will be changed");
        Box::new(DryRunExecutor::new(SystemExecutor))
    } else {
        Box::new(SystemExecutor)
    };

    let mut installer = Installer::new(settings, executor, args.dry_run);

    // With --print-plan stdout carries the JSON document only
    let result = if args.print_plan {
        print_plan(&mut installer)
    } else {
        ui::banner(&format!("Exliar installer {}", exliar_install::VERSION));
        installer.run(&mut TerminalPrompter::default())
    };

    if let Some(path) = &args.journal {
        if let Err(err) = installer.journal().save(path) {
            error!("{}", err);
        }
    }

    if let Err(err) = result {
        ui::failure(&err.to_string());
        if !installer.journal().stage().disk_touched() {
            ui::note("Nothing was changed on this machine.");
        }
        installer.journal().report_failure();
        std::process::exit(err.exit_code());
    }
}

fn load_settings(args: &Args) -> Result<InstallSettings> {
    let settings = match &args.config {
        Some(path) => InstallSettings::load(path)?,
        None => InstallSettings::default(),
    };
    settings.validate()?;
    Ok(settings)
}

fn print_plan<E: Executor>(installer: &mut Installer<E>) -> Result<()> {
    let plan = installer.preflight()?;
    println!("{}", plan.to_json()?);
    Ok(())
}
