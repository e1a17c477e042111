use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::workspace::WorkspaceError;

const CHUNK_CHANNEL_CAPACITY: usize = 64;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Starts `cmd args...` in `cwd` and returns its interleaved stdout/stderr.
    async fn run(&self, cmd: &str, args: &[String], cwd: &Path) -> Result<CommandStream, WorkspaceError>;
}

/// Output of a running command. Dropping the stream (or calling [`cancel`](Self::cancel))
/// terminates the process if it is still running.
pub struct CommandStream {
    rx: mpsc::Receiver<String>,
    cancel: Option<oneshot::Sender<()>>,
}

impl CommandStream {
    pub fn new(rx: mpsc::Receiver<String>, cancel: oneshot::Sender<()>) -> Self {
        Self { rx, cancel: Some(cancel) }
    }

    pub async fn next_chunk(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Reads until the process closes both pipes.
    pub async fn collect_text(mut self) -> String {
        let mut out = String::new();
        while let Some(chunk) = self.next_chunk().await {
            out.push_str(&chunk);
        }
        out
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs commands through the platform shell on this machine.
#[derive(Debug, Default, Clone)]
pub struct LocalCommandRunner;

impl LocalCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(line);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }
}

/// Decodes a byte stream as UTF-8, holding back a sequence cut off at the end
/// of one read until the next read completes it.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Truncated sequence: keep it for the next read.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

async fn forward<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut decoder = Utf8Decoder::default();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && tx.send(text).await.is_err() {
                    return;
                }
            }
        }
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send(rest).await;
    }
}

#[async_trait]
impl CommandRunner for LocalCommandRunner {
    async fn run(&self, cmd: &str, args: &[String], cwd: &Path) -> Result<CommandStream, WorkspaceError> {
        let mut line = cmd.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        debug!(command = %line, cwd = %cwd.display(), "spawning command");

        let mut child = shell_command(&line)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward(stderr, tx.clone()));
        }
        drop(tx);

        tokio::spawn(async move {
            let cancelled = tokio::select! {
                status = child.wait() => {
                    debug!(?status, "command exited");
                    false
                }
                _ = cancel_rx => true,
            };
            if cancelled {
                debug!("command cancelled");
                let _ = child.kill().await;
            }
        });

        Ok(CommandStream::new(rx, cancel_tx))
    }
}
