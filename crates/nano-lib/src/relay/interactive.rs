//! Interactive shell sessions

use crate::engine::{AttachedExec, ContainerEngine};
use crate::error::{NanoError, Result};
use crate::identity::ClusterIdentity;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

/// Terminal size in columns and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn current() -> Result<Self> {
        let (cols, rows) = terminal::size()?;
        Ok(Self { cols, rows })
    }
}

/// Restores the terminal mode on drop.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Forward every SIGWINCH to the remote session.
#[cfg(unix)]
fn spawn_resize_forwarder(engine: Arc<dyn ContainerEngine>, exec_id: String) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sigwinch = match signal(SignalKind::window_change()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGWINCH handler");
                return;
            }
        };

        while sigwinch.recv().await.is_some() {
            let Ok(size) = TerminalSize::current() else {
                continue;
            };
            if let Err(e) = engine.resize_exec(&exec_id, size.cols, size.rows).await {
                eprintln!("Failed to resize container TTY: {}", e);
            }
        }
    })
}

#[cfg(not(unix))]
fn spawn_resize_forwarder(_engine: Arc<dyn ContainerEngine>, _exec_id: String) -> JoinHandle<()> {
    tokio::spawn(async {})
}

/// Open `bash` in the cluster container and bridge it to this terminal.
///
/// Returns once the remote side closes.
pub async fn enter(engine: Arc<dyn ContainerEngine>, identity: &ClusterIdentity) -> Result<()> {
    let AttachedExec {
        exec_id,
        mut output,
        mut input,
    } = engine
        .exec_interactive(identity.canonical_name(), vec!["bash".to_string()])
        .await?;

    let _raw_guard = RawModeGuard::new()?;

    if let Ok(size) = TerminalSize::current() {
        debug!(cols = size.cols, rows = size.rows, "Initial terminal size");
        if let Err(e) = engine.resize_exec(&exec_id, size.cols, size.rows).await {
            debug!(error = %e, "Initial resize failed");
        }
    }

    let resize_task = spawn_resize_forwarder(engine.clone(), exec_id);

    let stdin_task = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if input.write_all(&buf[..n]).await.is_err() || input.flush().await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    let result = async {
        let mut stdout = tokio::io::stdout();
        while let Some(chunk) = output.next().await {
            stdout.write_all(&chunk?).await?;
            stdout.flush().await?;
        }
        Ok::<(), NanoError>(())
    }
    .await;

    stdin_task.abort();
    resize_task.abort();
    result
}
