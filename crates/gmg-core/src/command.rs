//! Toolchain process execution.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Check if the command succeeded.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A command runner that captures output and provides structured results.
///
/// The environment override is how tests point the toolchain at a fake
/// module host without touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    /// Working directory for commands
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set on top of the inherited environment
    pub env: Vec<(String, String)>,
}

impl CommandRunner {
    /// Create a new command runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add several environment variables.
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Run a command and capture output. The child is killed if the token is
    /// canceled or the returned future is dropped.
    pub async fn run<S, I>(&self, cancel: &CancellationToken, program: S, args: I) -> Result<CommandOutput>
    where
        S: AsRef<OsStr>,
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let program_ref = program.as_ref();
        let args_vec: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();

        debug!(
            program = %program_ref.to_string_lossy(),
            args = ?args_vec,
            wd = ?self.working_dir,
            "running command"
        );

        let mut cmd = Command::new(program_ref);
        cmd.args(&args_vec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let start = Instant::now();
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Canceled),
            output = cmd.output() => output.map_err(|e| Error::Io {
                message: format!("failed to execute {}", program_ref.to_string_lossy()),
                path: None,
                source: e,
            })?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "command completed"
        );

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run a command and return an error if it exits non-zero.
    pub async fn run_checked<S, I>(
        &self,
        cancel: &CancellationToken,
        program: S,
        args: I,
    ) -> Result<CommandOutput>
    where
        S: AsRef<OsStr>,
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let args_vec: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let command = display_command(program.as_ref(), args_vec.iter().map(|a| a.as_os_str()));
        let output = self.run(cancel, program.as_ref(), args_vec.iter()).await?;
        if !output.success() {
            return Err(Error::CommandFailed {
                command,
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Run a command and decode its standard output as a stream of JSON
    /// records (the `go list -json` convention: concatenated objects, no
    /// surrounding array).
    pub async fn run_json<T, S, I>(
        &self,
        cancel: &CancellationToken,
        program: S,
        args: I,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        S: AsRef<OsStr>,
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let args_vec: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let command = display_command(program.as_ref(), args_vec.iter().map(|a| a.as_os_str()));
        let output = self.run_checked(cancel, program.as_ref(), args_vec.iter()).await?;
        let mut records = Vec::new();
        for record in serde_json::Deserializer::from_str(&output.stdout).into_iter::<T>() {
            records.push(record.map_err(|e| {
                Error::parse(format!("failed to decode JSON from command {command:?}: {e}"))
            })?);
        }
        Ok(records)
    }
}

fn display_command<'a>(program: &OsStr, args: impl Iterator<Item = &'a OsStr>) -> String {
    let mut out = program.to_string_lossy().into_owned();
    for arg in args {
        out.push(' ');
        out.push_str(&arg.to_string_lossy());
    }
    out
}
