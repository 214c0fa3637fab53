//! Primary ("seamless") back-end: drives a subprocess over a bidirectional
//! JSON-line IPC channel, so pause/resume/seek/filter changes apply without
//! restarting the decode pipeline.

use crate::adapter::PlayerAdapter;
use crate::ipc::{IpcClient, IpcEvent};
use crate::{PlayerError, Result};
use async_trait::async_trait;
use cueline_core::FinishReason;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

#[cfg(windows)]
const IPC_CONNECT_ATTEMPTS: u32 = 50;
#[cfg(windows)]
const IPC_CONNECT_DELAY: Duration = Duration::from_millis(150);
#[cfg(not(windows))]
const IPC_CONNECT_ATTEMPTS: u32 = 20;
#[cfg(not(windows))]
const IPC_CONNECT_DELAY: Duration = Duration::from_millis(100);

enum Control {
    Stop(oneshot::Sender<()>),
}

struct Session {
    ipc: Arc<IpcClient>,
    control: mpsc::Sender<Control>,
    started_at: std::sync::Mutex<Instant>,
    paused_at: std::sync::Mutex<Option<Instant>>,
    offset_ms: AtomicU64,
    playing: std::sync::atomic::AtomicBool,
}

pub struct SeamlessAdapter {
    executable: PathBuf,
    session: Mutex<Option<Arc<Session>>>,
    socket_counter: AtomicU32,
    volume: AtomicU32,
}

impl SeamlessAdapter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            session: Mutex::new(None),
            socket_counter: AtomicU32::new(0),
            volume: AtomicU32::new(100),
        }
    }

    fn socket_path(&self) -> PathBuf {
        let n = self.socket_counter.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("cueline-seamless-{}-{n}.sock", std::process::id()))
    }

    async fn spawn_backend(&self, file_path: &Path, start_offset_ms: u64) -> Result<(Child, Arc<IpcClient>, mpsc::Receiver<IpcEvent>, PathBuf)> {
        let socket_path = self.socket_path();
        let child = Command::new(&self.executable)
            .arg("--ipc-server")
            .arg(&socket_path)
            .arg("--start-offset-ms")
            .arg(start_offset_ms.to_string())
            .arg(file_path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlayerError::BackendUnavailable(format!("failed to spawn {}: {e}", self.executable.display())))?;

        let (ipc, events) = IpcClient::connect(&socket_path, IPC_CONNECT_ATTEMPTS, IPC_CONNECT_DELAY).await?;
        Ok((child, Arc::new(ipc), events, socket_path))
    }
}

#[async_trait]
impl PlayerAdapter for SeamlessAdapter {
    async fn play(&self, file_path: &Path, start_offset_ms: u64) -> Result<FinishReason> {
        self.stop().await?;

        let (mut child, ipc, mut events, socket_path) = self.spawn_backend(file_path, start_offset_ms).await?;

        let (control_tx, mut control_rx) = mpsc::channel(4);
        let session = Arc::new(Session {
            ipc: ipc.clone(),
            control: control_tx,
            started_at: std::sync::Mutex::new(Instant::now()),
            paused_at: std::sync::Mutex::new(None),
            offset_ms: AtomicU64::new(start_offset_ms),
            playing: std::sync::atomic::AtomicBool::new(true),
        });
        *self.session.lock().await = Some(session.clone());

        let reason = loop {
            tokio::select! {
                status = child.wait() => {
                    let _ = std::fs::remove_file(&socket_path);
                    let reason = match status {
                        Ok(status) if status.success() => FinishReason::Ended,
                        _ => FinishReason::Error,
                    };
                    break reason;
                }
                event = events.recv() => {
                    match event {
                        Some(IpcEvent { name, .. }) if name == "end-file" => {
                            let _ = child.start_kill();
                            let _ = std::fs::remove_file(&socket_path);
                            break FinishReason::Ended;
                        }
                        Some(_) => continue,
                        None => {
                            let _ = child.start_kill();
                            let _ = std::fs::remove_file(&socket_path);
                            break FinishReason::Error;
                        }
                    }
                }
                control = control_rx.recv() => {
                    match control {
                        Some(Control::Stop(ack)) => {
                            let _ = child.start_kill();
                            let _ = child.wait().await;
                            let _ = std::fs::remove_file(&socket_path);
                            let _ = ack.send(());
                            break FinishReason::Stopped;
                        }
                        None => continue,
                    }
                }
            }
        };

        session.playing.store(false, Ordering::SeqCst);
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

    async fn pause(&self) -> Result<()> {
        let session = self.current_session().await?;
        session
            .ipc
            .command(&[serde_json::json!("set_property"), serde_json::json!("pause"), serde_json::json!(true)])
            .await?;
        *session.paused_at.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let session = self.current_session().await?;
        session
            .ipc
            .command(&[serde_json::json!("set_property"), serde_json::json!("pause"), serde_json::json!(false)])
            .await?;
        if let Some(paused_at) = session.paused_at.lock().unwrap().take() {
            let mut started_at = session.started_at.lock().unwrap();
            *started_at += paused_at.elapsed();
        }
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        let session = self.current_session().await?;
        session
            .ipc
            .command(&[
                serde_json::json!("seek"),
                serde_json::json!(position_ms as f64 / 1000.0),
                serde_json::json!("absolute"),
            ])
            .await?;
        session.offset_ms.store(position_ms, Ordering::SeqCst);
        *session.started_at.lock().unwrap() = Instant::now();
        Ok(())
    }

    async fn get_position(&self) -> Result<u64> {
        let session = self.current_session().await?;
        let offset = session.offset_ms.load(Ordering::SeqCst);
        let elapsed = match *session.paused_at.lock().unwrap() {
            Some(paused_at) => paused_at.duration_since(*session.started_at.lock().unwrap()),
            None => session.started_at.lock().unwrap().elapsed(),
        };
        Ok(offset + elapsed.as_millis() as u64)
    }

    async fn set_volume(&self, volume: u8) -> Result<()> {
        self.volume.store(volume as u32, Ordering::SeqCst);
        if let Some(session) = self.session.lock().await.as_ref() {
            session
                .ipc
                .command(&[serde_json::json!("set_property"), serde_json::json!("volume"), serde_json::json!(volume)])
                .await?;
        }
        Ok(())
    }

    async fn get_volume(&self) -> Result<u8> {
        Ok(self.volume.load(Ordering::SeqCst) as u8)
    }

    async fn update_filters(&self, filter_chain: &str) -> Result<()> {
        let session = self.current_session().await?;
        session
            .ipc
            .command(&[serde_json::json!("set_property"), serde_json::json!("af"), serde_json::json!(filter_chain)])
            .await?;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.session
            .try_lock()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.playing.load(Ordering::SeqCst)))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "primary"
    }
}

impl SeamlessAdapter {
    async fn current_session(&self) -> Result<Arc<Session>> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or_else(|| PlayerError::Unsupported("no active session".into()))
    }
}
