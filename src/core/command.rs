// External tool execution
//
// Every step of the installation is a call to a standard OS tool. Calls are
// described as `Invocation` values and handed to an `Executor`, which either
// runs them or, in dry-run mode, only reports the mutating ones.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::{debug, info, warn};
use which::which;

use crate::error::{InstallError, IoContext, Result};

/// Whether an invocation changes anything on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Read-only probe (`lscpu`, `lspci`, `lsblk`, `genfstab`)
    Probe,
    /// Touches disks, filesystems or the target system
    Mutating,
}

/// A single external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub effect: Effect,
}

impl Invocation {
    pub fn new(program: &str, effect: Effect) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            stdin: None,
            effect,
        }
    }

    pub fn probe(program: &str) -> Self {
        Self::new(program, Effect::Probe)
    }

    pub fn mutating(program: &str) -> Self {
        Self::new(program, Effect::Mutating)
    }

    /// Runs `command` inside the target root through `arch-chroot`
    pub fn chroot(root: &str, command: &[&str]) -> Self {
        Self::mutating("arch-chroot").arg(root).args(command.iter().copied())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Data piped to the process; never shown in logs
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn is_mutating(&self) -> bool {
        self.effect == Effect::Mutating
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        if self.stdin.is_some() {
            write!(f, " < [stdin]")?;
        }
        Ok(())
    }
}

/// Runs invocations. Implementations must be synchronous.
pub trait Executor {
    /// Runs the command, inheriting stdout/stderr
    fn run(&mut self, invocation: &Invocation, context: &'static str) -> Result<()>;

    /// Runs the command and captures its stdout
    fn output(&mut self, invocation: &Invocation, context: &'static str) -> Result<String>;

    /// Fails when `program` cannot be run on this host
    fn check_tool(&self, _program: &str) -> Result<()> {
        Ok(())
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn run(&mut self, invocation: &Invocation, context: &'static str) -> Result<()> {
        (**self).run(invocation, context)
    }

    fn output(&mut self, invocation: &Invocation, context: &'static str) -> Result<String> {
        (**self).output(invocation, context)
    }

    fn check_tool(&self, program: &str) -> Result<()> {
        (**self).check_tool(program)
    }
}

/// A tool resolved from PATH
#[derive(Debug)]
pub struct Tool {
    exec: PathBuf,
}

impl Tool {
    pub fn find(name: &str) -> Result<Self> {
        Ok(Self {
            exec: which(name).map_err(|_| InstallError::ToolNotFound(name.to_string()))?,
        })
    }

    pub fn execute(&self) -> Command {
        Command::new(&self.exec)
    }
}

/// Executes invocations on the real system
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(invocation: &Invocation) -> Result<Command> {
        let mut command = Tool::find(&invocation.program)?.execute();
        command.args(&invocation.args);
        Ok(command)
    }
}

impl Executor for SystemExecutor {
    fn run(&mut self, invocation: &Invocation, context: &'static str) -> Result<()> {
        debug!("Executing: {}", invocation);
        let mut command = Self::command(invocation)?;
        if invocation.stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command.spawn().context(context)?;
        if let (Some(data), Some(mut pipe)) = (&invocation.stdin, child.stdin.take()) {
            if let Err(e) = pipe.write_all(data.as_bytes()) {
                drop(pipe);
                // Reap the child before reporting
                let _ = child.wait();
                return Err(InstallError::io(context, e));
            }
        }
        let status = child.wait().context(context)?;

        if !status.success() {
            return Err(InstallError::CommandFailed {
                context,
                command: invocation.to_string(),
                status,
            });
        }
        Ok(())
    }

    fn output(&mut self, invocation: &Invocation, context: &'static str) -> Result<String> {
        debug!("Executing: {}", invocation);
        let output = Self::command(invocation)?.output().context(context)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("{}", stderr.trim());
            return Err(InstallError::CommandFailed {
                context,
                command: invocation.to_string(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn check_tool(&self, program: &str) -> Result<()> {
        Tool::find(program).map(|_| ())
    }
}

/// Runs probes through `inner`, only reports mutating invocations
#[derive(Debug)]
pub struct DryRunExecutor<E: Executor = SystemExecutor> {
    inner: E,
}

impl<E: Executor> DryRunExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Executor> Executor for DryRunExecutor<E> {
    fn run(&mut self, invocation: &Invocation, context: &'static str) -> Result<()> {
        if invocation.is_mutating() {
            info!("[DRY RUN] Would execute: {}", invocation);
            return Ok(());
        }
        self.inner.run(invocation, context)
    }

    fn output(&mut self, invocation: &Invocation, context: &'static str) -> Result<String> {
        if invocation.is_mutating() {
            info!("[DRY RUN] Would execute: {}", invocation);
            return Ok(String::new());
        }
        self.inner.output(invocation, context)
    }

    fn check_tool(&self, program: &str) -> Result<()> {
        if let Err(e) = self.inner.check_tool(program) {
            warn!("[DRY RUN] {}", e);
        }
        Ok(())
    }
}
