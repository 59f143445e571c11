// src/exec/command.rs

//! Shell commands as task bodies.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tracing::{debug, info};

use crate::dag::task::TaskBody;

/// Body that runs `cmd` through the platform shell and fails on a non-zero
/// exit status.
pub fn command_body(task: impl Into<String>, cmd: impl Into<String>) -> TaskBody {
    let task = task.into();
    let cmd = cmd.into();
    std::sync::Arc::new(move || run_command_blocking(&task, &cmd))
}

/// Run a shell command to completion from synchronous code.
///
/// Uses the surrounding runtime when called from a pool thread; otherwise
/// (e.g. on the coordinator) spins up a throwaway current-thread runtime.
pub fn run_command_blocking(task: &str, cmd: &str) -> Result<()> {
    match Handle::try_current() {
        Ok(handle) => handle.block_on(run_command(task, cmd)),
        Err(_) => Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building runtime for command")?
            .block_on(run_command(task, cmd)),
    }
}

pub async fn run_command(task: &str, cmd: &str) -> Result<()> {
    info!(task = %task, cmd = %cmd, "starting task process");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = task.to_string();
    let stdout_pump = async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %out_task, "stdout: {}", line);
            }
        }
    };

    let err_task = task.to_string();
    let stderr_pump = async move {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %err_task, "stderr: {}", line);
            }
        }
    };

    let (status, (), ()) = tokio::join!(child.wait(), stdout_pump, stderr_pump);
    let status = status.with_context(|| format!("waiting for process of task '{task}'"))?;

    let code = status.code().unwrap_or(-1);
    info!(
        task = %task,
        exit_code = code,
        success = status.success(),
        "task process exited"
    );

    if !status.success() {
        bail!("command `{cmd}` exited with status {code}");
    }
    Ok(())
}
