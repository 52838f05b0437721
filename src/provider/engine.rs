//! External tunneling engine supervision
//!
//! An [`EngineProcess`] owns both the generated configuration file and the
//! spawned child. Dropping it kills the child and deletes the file, so an
//! engine can never outlive the provider that started it.

use crate::error::{Result, VpnError};
use crate::logging::Logger;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Placeholder in engine arguments replaced by the config file path
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// How to launch an engine binary
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    pub config_dir: Option<std::path::PathBuf>,
}

/// A running engine and its configuration artifact
#[derive(Debug)]
pub struct EngineProcess {
    program: String,
    child: Child,
    config_file: NamedTempFile,
    log: Logger,
}

impl EngineProcess {
    /// Write `config` to a private temp file and start the engine on it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(command: &EngineCommand, config: &serde_json::Value, log: Logger) -> Result<Self> {
        let config_file = write_config(config, command.config_dir.as_deref())?;
        let config_path = config_file.path().to_string_lossy().into_owned();

        let args: Vec<String> = command
            .args
            .iter()
            .map(|arg| arg.replace(CONFIG_PLACEHOLDER, &config_path))
            .collect();

        let mut child = Command::new(&command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VpnError::Process(format!("failed to start {}: {e}", command.program)))?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, command.program.clone(), log.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, command.program.clone(), log.clone());
        }

        log.info(format_args!(
            "started {} (pid {})",
            command.program,
            child.id().map_or_else(|| "?".to_string(), |pid| pid.to_string())
        ));

        Ok(Self {
            program: command.program.clone(),
            child,
            config_file,
            log,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn config_path(&self) -> &Path {
        self.config_file.path()
    }

    /// Whether the child is still alive
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Give the engine `grace` to come up; fail if it has already exited
    pub async fn wait_for_startup(&mut self, grace: Duration) -> Result<()> {
        tokio::time::sleep(grace).await;
        match self.child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(VpnError::Process(format!(
                "{} exited during startup ({status})",
                self.program
            ))),
            Err(e) => Err(VpnError::Process(format!(
                "failed to poll {}: {e}",
                self.program
            ))),
        }
    }

    /// Terminate the engine, escalating to a kill after `timeout`
    pub async fn stop(mut self, timeout: Duration) -> Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            self.log
                .info(format_args!("{} had already exited ({status})", self.program));
            return Ok(());
        }

        #[cfg(unix)]
        {
            if self.terminate() {
                match tokio::time::timeout(timeout, self.child.wait()).await {
                    Ok(Ok(status)) => {
                        self.log
                            .info(format_args!("{} stopped ({status})", self.program));
                        return Ok(());
                    }
                    Ok(Err(e)) => {
                        self.log
                            .warn(format_args!("waiting for {} failed: {e}", self.program));
                    }
                    Err(_) => {
                        self.log.warn(format_args!(
                            "{} ignored SIGTERM for {timeout:?}, killing",
                            self.program
                        ));
                    }
                }
            }
        }
        #[cfg(not(unix))]
        let _ = timeout;

        self.child
            .kill()
            .await
            .map_err(|e| VpnError::Process(format!("failed to kill {}: {e}", self.program)))?;
        self.log.info(format_args!("{} killed", self.program));
        Ok(())
    }

    #[cfg(unix)]
    fn terminate(&self) -> bool {
        let Some(pid) = self.child.id() else {
            return false;
        };
        // SAFETY: signals a child we spawned and have not reaped
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
    }
}

fn write_config(config: &serde_json::Value, dir: Option<&Path>) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("rvpnmux-engine-").suffix(".json");

    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    serde_json::to_writer_pretty(&mut file, config)?;
    file.flush()?;
    Ok(file)
}

fn forward_output<R>(stream: R, program: String, log: Logger)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log.debug(format_args!("[{program}] {line}"));
        }
    });
}
