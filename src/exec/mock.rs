//! Scripted exec channel for unit tests.

use crate::error::{Result, RtlessError};
use crate::exec::{ExecChannel, LineReceiver};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct ScriptedResponse {
    lines: Vec<String>,
    /// Keep the stream open after the scripted lines until cancelled
    hold_open: bool,
}

/// Records every command and replays scripted outputs in FIFO order.
///
/// Once the script is exhausted every command produces empty output.
pub struct MockExecChannel {
    commands: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    connected: AtomicBool,
}

impl MockExecChannel {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Queue output for the next command
    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses.lock().push_back(ScriptedResponse {
            lines: lines.into_iter().map(Into::into).collect(),
            hold_open: false,
        });
    }

    /// Queue output for the next command; its stream stays open until cancelled
    pub fn push_open_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses.lock().push_back(ScriptedResponse {
            lines: lines.into_iter().map(Into::into).collect(),
            hold_open: true,
        });
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn next_response(&self, command: &str) -> Result<ScriptedResponse> {
        if !self.is_connected() {
            return Err(RtlessError::NotConnected);
        }
        self.commands.lock().push(command.to_string());
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or(ScriptedResponse {
                lines: Vec::new(),
                hold_open: false,
            }))
    }
}

impl Default for MockExecChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecChannel for MockExecChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn run(&self, command: &str) -> Result<String> {
        let response = self.next_response(command)?;
        let mut output = response.lines.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        Ok(output)
    }

    async fn run_streaming(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<LineReceiver> {
        let response = self.next_response(command)?;
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            for line in response.lines {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(line) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            if response.hold_open {
                cancel.cancelled().await;
            }
        });

        Ok(rx)
    }
}
