//! Fallback ("restart") back-end: no control channel. Pause/seek/filter
//! changes are implemented by killing and re-spawning the subprocess at a
//! computed offset.

use crate::adapter::PlayerAdapter;
use crate::{PlayerError, Result};
use async_trait::async_trait;
use cueline_core::FinishReason;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

const KILL_GRACE: Duration = Duration::from_millis(100);

enum Control {
    Stop(oneshot::Sender<()>),
}

struct Session {
    control: mpsc::Sender<Control>,
    started_at: std::sync::Mutex<Instant>,
    offset_ms: AtomicU64,
}

pub struct RestartAdapter {
    executable: PathBuf,
    session: Mutex<Option<Session>>,
    volume: AtomicU32,
    filter_chain: Mutex<String>,
}

impl RestartAdapter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            session: Mutex::new(None),
            volume: AtomicU32::new(100),
            filter_chain: Mutex::new(String::new()),
        }
    }

    async fn spawn_backend(&self, file_path: &Path, start_offset_ms: u64) -> Result<Child> {
        let filter_chain = self.filter_chain.lock().await.clone();
        Command::new(&self.executable)
            .arg("--filter-chain")
            .arg(&filter_chain)
            .arg("--start-offset-ms")
            .arg(start_offset_ms.to_string())
            .arg("--volume")
            .arg(self.volume.load(Ordering::SeqCst).to_string())
            .arg(file_path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlayerError::BackendUnavailable(format!("failed to spawn {}: {e}", self.executable.display())))
    }

    /// Terminates the subprocess: SIGTERM-equivalent, a grace period, then a
    /// forced kill. `pauseAt = killedAt - startedAt + previousOffset`.
    async fn terminate(child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
                if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                    return;
                }
            }
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[async_trait]
impl PlayerAdapter for RestartAdapter {
    async fn play(&self, file_path: &Path, start_offset_ms: u64) -> Result<FinishReason> {
        self.stop().await?;

        let mut child = self.spawn_backend(file_path, start_offset_ms).await?;
        let (control_tx, mut control_rx) = mpsc::channel(4);
        *self.session.lock().await = Some(Session {
            control: control_tx,
            started_at: std::sync::Mutex::new(Instant::now()),
            offset_ms: AtomicU64::new(start_offset_ms),
        });

        let reason = tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => FinishReason::Ended,
                _ => FinishReason::Error,
            },
            control = control_rx.recv() => match control {
                Some(Control::Stop(ack)) => {
                    Self::terminate(&mut child).await;
                    let _ = ack.send(());
                    FinishReason::Stopped
                }
                None => FinishReason::Error,
            },
        };

        *self.session.lock().await = None;
        Ok(reason)
    }

    async fn stop(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            let (tx, rx) = oneshot::channel();
            if session.control.send(Control::Stop(tx)).await.is_ok() {
                let _ = rx.await;
            }
        }
        Ok(())
    }

    /// No control channel: pause kills the subprocess. The orchestrator is
    /// expected to call `play` again at the reported position to resume,
    /// exactly as it does on a fresh start.
    async fn pause(&self) -> Result<()> {
        self.stop().await
    }

    async fn resume(&self) -> Result<()> {
        Err(PlayerError::Unsupported(
            "fallback backend has no resume; call play() at the last reported position".into(),
        ))
    }

    async fn seek(&self, _position_ms: u64) -> Result<()> {
        Err(PlayerError::Unsupported(
            "fallback backend has no seek; call play() at the desired position".into(),
        ))
    }

    async fn get_position(&self) -> Result<u64> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| PlayerError::Unsupported("no active session".into()))?;
        let offset = session.offset_ms.load(Ordering::SeqCst);
        let elapsed = session.started_at.lock().unwrap().elapsed();
        Ok(offset + elapsed.as_millis() as u64)
    }

    async fn set_volume(&self, volume: u8) -> Result<()> {
        self.volume.store(volume as u32, Ordering::SeqCst);
        // Applied at the next spawn, matching the teacher's spawn-time
        // argument passing; no live subprocess is signaled.
        Ok(())
    }

    async fn get_volume(&self) -> Result<u8> {
        Ok(self.volume.load(Ordering::SeqCst) as u8)
    }

    async fn update_filters(&self, filter_chain: &str) -> Result<()> {
        *self.filter_chain.lock().await = filter_chain.to_string();
        Err(PlayerError::Unsupported(
            "fallback backend applies filters only at next spawn; caller must restart at offset".into(),
        ))
    }

    fn is_playing(&self) -> bool {
        self.session.try_lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}
