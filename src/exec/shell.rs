//! Exec channel backed by a local `sh -c` or the system `ssh` client.

use crate::error::{Result, RtlessError};
use crate::exec::{ExecChannel, LineReceiver};
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default capacity for the per-command line channel.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

/// Runs each command in a fresh process: `<launcher...> <command>`.
pub struct ShellChannel {
    launcher: Vec<String>,
    connected: AtomicBool,
    stream_capacity: usize,
}

impl ShellChannel {
    /// Run commands through the local `sh`
    pub fn local() -> Self {
        Self::with_launcher(vec!["sh".to_string(), "-c".to_string()])
    }

    /// Run commands on `destination` through the system `ssh` client
    ///
    /// Authentication is left entirely to ssh (agent, keys, config); batch mode keeps
    /// it from prompting.
    pub fn over_ssh(destination: impl Into<String>) -> Self {
        Self::with_launcher(vec![
            "ssh".to_string(),
            "-T".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            destination.into(),
        ])
    }

    pub fn with_launcher(launcher: Vec<String>) -> Self {
        Self {
            launcher,
            connected: AtomicBool::new(true),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    /// Mark the channel as disconnected; later calls fail with `NotConnected`
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn command(&self, command: &str) -> Result<Command> {
        let (program, args) = self
            .launcher
            .split_first()
            .ok_or_else(|| RtlessError::invalid_argument("empty launcher"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        Ok(cmd)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(RtlessError::NotConnected)
        }
    }
}

#[async_trait]
impl ExecChannel for ShellChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn run(&self, command: &str) -> Result<String> {
        self.ensure_connected()?;
        debug!("run: {command}");

        let output = self
            .command(command)?
            .output()
            .await
            .map_err(|e| RtlessError::channel("failed to run command", e))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_streaming(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<LineReceiver> {
        self.ensure_connected()?;
        debug!("stream: {command}");

        let mut child = self
            .command(command)?
            .spawn()
            .map_err(|e| RtlessError::channel("failed to spawn command", e))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            RtlessError::channel(
                "command has no stdout",
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
            )
        })?;

        let (tx, rx) = mpsc::channel(self.stream_capacity);

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            let mut reached_eof = false;

            loop {
                buf.clear();
                let read = tokio::select! {
                    _ = cancel.cancelled() => break,
                    read = reader.read_until(b'\n', &mut buf) => read,
                };

                match read {
                    Ok(0) => {
                        reached_eof = true;
                        break;
                    }
                    Ok(_) => {
                        if buf.last() == Some(&b'\n') {
                            buf.pop();
                        }
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        let sent = tokio::select! {
                            _ = cancel.cancelled() => break,
                            sent = tx.send(line) => sent,
                        };
                        if sent.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("stdout read failed: {e}");
                        break;
                    }
                }
            }

            if !reached_eof {
                let _ = child.start_kill();
            }
            let _ = child.wait().await;
        });

        Ok(rx)
    }
}
