// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subprocess execution with piped stdio.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};

/// One subprocess to run to completion.
#[derive(Debug, Clone, Default)]
pub struct ExecTask {
    /// Program to run
    pub command: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory; inherited when `None`
    pub cwd: Option<PathBuf>,
    /// Environment overrides on top of the inherited environment
    pub env: HashMap<String, String>,
    /// Bytes written to stdin, which is then closed
    pub stdin: Vec<u8>,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

/// Captured outcome of an [`ExecTask`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Everything written to stdout
    pub stdout: String,
    /// Everything written to stderr
    pub stderr: String,
    /// Exit code; `None` when killed by a signal
    pub exit_code: Option<i32>,
}

impl ExecResult {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl ExecTask {
    /// Task running `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    /// Add environment overrides.
    pub fn envs(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Set the stdin payload.
    pub fn stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = stdin;
        self
    }

    /// Set a timeout.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the process and capture its output.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ExecResult::exit_code`].
    pub async fn execute(self) -> Result<ExecResult> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        debug!(command = %self.command, pid = ?child.id(), "Spawned handler process");

        // written concurrently so a handler that prints before reading cannot deadlock
        let stdin_writer = child.stdin.take().map(|mut stdin| {
            let payload = self.stdin;
            tokio::spawn(async move {
                match stdin.write_all(&payload).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("Handler closed stdin before reading all input");
                    }
                    Err(e) => warn!(error = %e, "Failed to write handler stdin"),
                }
            })
        });

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RuntimeError::Timeout(limit))??,
            None => child.wait_with_output().await?,
        };

        if let Some(writer) = stdin_writer {
            let _ = writer.await;
        }

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
