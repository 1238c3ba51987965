//! Server process boundary
//!
//! [`ProcessHost`] is everything the lifecycle manager needs from the OS:
//! spawning the JVM, running the stop command, killing stray runtimes and
//! probing the port. [`SystemHost`] is the real implementation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::PilotError;
use crate::monitor::processor::{LineSender, RawLine};
use crate::tomcat::install::{ServerInstallation, BOOTSTRAP_CLASS};
use crate::tomcat::port::is_port_bound;

/// Bootstrap command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapCommand {
    Start,
    Stop,
}

impl BootstrapCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapCommand::Start => "start",
            BootstrapCommand::Stop => "stop",
        }
    }
}

/// JVM launch options
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Passed before the classpath
    pub java_opts: Vec<String>,

    /// JPDA port for debug launches
    pub debug_port: Option<u16>,
}

/// JDWP agent argument for a debug port
pub fn jdwp_arg(port: u16) -> String {
    format!(
        "-agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=*:{}",
        port
    )
}

/// Arguments for `java`, excluding the executable
pub fn jvm_args(
    install: &ServerInstallation,
    command: BootstrapCommand,
    options: &LaunchOptions,
) -> Vec<String> {
    let mut args = Vec::new();
    if command == BootstrapCommand::Start {
        if let Some(port) = options.debug_port {
            args.push(jdwp_arg(port));
        }
        args.extend(options.java_opts.iter().cloned());
    }
    args.push("-cp".to_string());
    args.push(install.bootstrap_classpath());
    args.push(format!("-Dcatalina.base={}", install.catalina_home.display()));
    args.push(format!("-Dcatalina.home={}", install.catalina_home.display()));
    args.push(format!("-Djava.io.tmpdir={}", install.temp_dir().display()));
    args.push(BOOTSTRAP_CLASS.to_string());
    args.push(command.as_str().to_string());
    args
}

/// A running server process
#[async_trait]
pub trait ServerProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Whether the process has already exited
    fn has_exited(&mut self) -> bool;

    /// Ask the process to exit, killing it after `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<(), PilotError>;
}

/// OS operations used by the lifecycle manager
#[async_trait]
pub trait ProcessHost: Send + Sync {
    /// Spawn the JVM, streaming its output into `lines`
    async fn spawn(
        &self,
        install: &ServerInstallation,
        args: Vec<String>,
        lines: LineSender,
    ) -> Result<Box<dyn ServerProcess>, PilotError>;

    /// Run a short-lived JVM command to completion
    async fn run_to_exit(
        &self,
        install: &ServerInstallation,
        args: Vec<String>,
    ) -> Result<(), PilotError>;

    /// Kill every runtime process belonging to this installation
    async fn kill_runtime(&self, install: &ServerInstallation) -> Result<usize, PilotError>;

    /// Whether the port is bound
    async fn port_in_use(&self, port: u16) -> bool;
}

/// Real process host
#[derive(Debug, Clone, Default)]
pub struct SystemHost;

impl SystemHost {
    fn command(install: &ServerInstallation, args: Vec<String>) -> Command {
        let mut cmd = Command::new(install.java());
        cmd.args(args)
            .current_dir(&install.catalina_home)
            .env("CATALINA_HOME", &install.catalina_home)
            .env("CATALINA_BASE", &install.catalina_home)
            .env("JAVA_HOME", &install.java_home);
        cmd
    }
}

#[async_trait]
impl ProcessHost for SystemHost {
    async fn spawn(
        &self,
        install: &ServerInstallation,
        args: Vec<String>,
        lines: LineSender,
    ) -> Result<Box<dyn ServerProcess>, PilotError> {
        debug!("Spawning {} {}", install.java().display(), args.join(" "));
        let mut child = Self::command(install, args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PilotError::ProcessError(format!("Failed to spawn java: {}", e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, lines.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, lines));
        }

        info!(pid = ?child.id(), "Server process spawned");
        Ok(Box::new(JvmProcess { child }))
    }

    async fn run_to_exit(
        &self,
        install: &ServerInstallation,
        args: Vec<String>,
    ) -> Result<(), PilotError> {
        let output = Self::command(install, args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PilotError::ProcessError(format!("Failed to run java: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PilotError::ProcessError(format!(
                "Stop command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn kill_runtime(&self, install: &ServerInstallation) -> Result<usize, PilotError> {
        let home_marker = format!("-Dcatalina.home={}", install.catalina_home.display());
        tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            system.refresh_processes(ProcessesToUpdate::All, true);

            let mut killed = 0;
            for (pid, process) in system.processes() {
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                if cmdline.contains(BOOTSTRAP_CLASS) && cmdline.contains(&home_marker) {
                    if process.kill() {
                        info!(pid = pid.as_u32(), "Killed runtime process");
                        killed += 1;
                    } else {
                        warn!(pid = pid.as_u32(), "Failed to kill runtime process");
                    }
                }
            }
            killed
        })
        .await
        .map_err(|e| PilotError::Internal(format!("Process scan panicked: {}", e)))
    }

    async fn port_in_use(&self, port: u16) -> bool {
        is_port_bound(port).await
    }
}

async fn pump<R>(reader: R, lines: LineSender)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if lines.send(RawLine::process(line)).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!("Output stream closed: {}", e);
                return;
            }
        }
    }
}

/// Child JVM
pub struct JvmProcess {
    child: Child,
}

#[async_trait]
impl ServerProcess for JvmProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), PilotError> {
        if self.has_exited() {
            return Ok(());
        }

        let signalled = self.pid().map(send_term).unwrap_or(false);
        if signalled {
            if let Ok(status) = tokio::time::timeout(grace, self.child.wait()).await {
                debug!("Server exited with {:?}", status.ok());
                return Ok(());
            }
            warn!("Server ignored termination signal for {:?}, killing", grace);
        }

        self.child
            .start_kill()
            .map_err(|e| PilotError::ProcessError(format!("Failed to kill server: {}", e)))?;
        self.child.wait().await?;
        Ok(())
    }
}

/// SIGTERM where the platform has it
fn send_term(pid: u32) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .and_then(|p| p.kill_with(Signal::Term))
        .unwrap_or(false)
}
