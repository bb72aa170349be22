//! Child-process construction, stdio streaming and lifecycle control.

use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch};

/// Spawn the game process with captured stdio.
///
/// stderr is merged into the same line stream as stdout; every line reaches
/// the sink as a `Stdio` event prefixed `[game:<id>:out]`. The spawner does
/// not interpret or filter output.
pub async fn spawn(
    id: &str,
    program: &Path,
    argv: &[String],
    working_dir: &Path,
    env_overrides: &HashMap<String, String>,
    sink: EventSink,
) -> Result<ProcessHandle, EngineError> {
    if !working_dir.exists() {
        tokio::fs::create_dir_all(working_dir)
            .await
            .map_err(|e| EngineError::io(working_dir, e))?;
    }

    log::debug!(
        "Exec command: {} {}",
        program.display(),
        argv.iter().map(|a| quote_arg(a)).collect::<Vec<_>>().join(" ")
    );
    log::debug!("Working directory: {:?}", working_dir);

    let mut command = tokio::process::Command::new(program);
    command
        .args(argv)
        .current_dir(working_dir)
        .envs(env_overrides)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(EngineError::SpawnFailed)?;

    let pid = child.id().ok_or_else(|| {
        EngineError::SpawnFailed(std::io::Error::new(
            std::io::ErrorKind::Other,
            "process exited before its pid could be read",
        ))
    })?;

    log::info!("Game process for {} started with pid {}", id, pid);
    (sink)(EngineEvent::Started {
        id: id.to_string(),
        pid,
    });

    let prefix = format!("[game:{}:out]", id);

    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, id.to_string(), prefix.clone(), sink.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, id.to_string(), prefix.clone(), sink.clone());
    }

    let (exit_tx, exit_rx) = watch::channel(None);
    let (force_tx, mut force_rx) = mpsc::channel::<()>(1);

    let monitor_id = id.to_string();
    tokio::spawn(async move {
        let code = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.ok().and_then(|s| s.code());
                }
                _ = force_rx.recv() => {
                    log::warn!("Force-killing game process {} (pid {})", monitor_id, pid);
                    let _ = child.kill().await;
                }
            }
        };

        match code {
            Some(0) => log::info!("Game process {} (pid {}) exited cleanly", monitor_id, pid),
            Some(n) => log::warn!("Game process {} (pid {}) exited with code {}", monitor_id, pid, n),
            None => log::warn!("Game process {} (pid {}) terminated by signal", monitor_id, pid),
        }

        let _ = exit_tx.send(Some(code));
        (sink)(EngineEvent::Exited {
            id: monitor_id,
            code,
        });
    });

    Ok(ProcessHandle {
        id: id.to_string(),
        pid,
        exit_rx,
        force_tx,
    })
}

fn spawn_line_reader<R>(reader: R, id: String, prefix: String, sink: EventSink)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            (sink)(EngineEvent::Stdio {
                id: id.clone(),
                line: format!("{} {}", prefix, line),
            });
        }
    });
}

/// Handle to a spawned game process.
#[derive(Debug)]
pub struct ProcessHandle {
    id: String,
    pid: u32,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
    force_tx: mpsc::Sender<()>,
}

impl ProcessHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the child to exit. `None` means it was killed by a signal
    /// before reporting a code.
    pub async fn wait(&self) -> Option<i32> {
        let mut rx = self.exit_rx.clone();
        let result = match rx.wait_for(|v| v.is_some()).await {
            Ok(value) => value.flatten(),
            Err(_) => None,
        };
        result
    }

    /// Ask the child to stop, escalating to a hard kill after `grace_ms`.
    ///
    /// On unix the soft phase is SIGTERM; elsewhere there is no portable
    /// soft signal, so the grace period only delays the hard kill.
    pub async fn kill(&self, grace_ms: u64) -> Option<i32> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill as send_signal, Signal};
            use nix::unistd::Pid;
            if let Err(e) = send_signal(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                log::debug!("SIGTERM to pid {} failed: {}", self.pid, e);
            }
        }

        let soft_wait =
            tokio::time::timeout(Duration::from_millis(grace_ms), self.wait()).await;
        if let Ok(code) = soft_wait {
            return code;
        }

        let _ = self.force_tx.send(()).await;
        self.wait().await
    }
}

/// Quote one argv element for the human-readable command log.
fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c == '\'')
    {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
