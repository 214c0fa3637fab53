//! Newline-delimited JSON control channel to the seamless back-end's
//! subprocess. One reader task demultiplexes responses (matched by
//! `request_id`) from unsolicited events (no `request_id`, e.g. `end-file`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};

#[derive(Debug, Clone, Serialize)]
struct IpcRequest<'a> {
    command: &'a [serde_json::Value],
    request_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct IpcFrame {
    request_id: Option<i64>,
    error: Option<String>,
    data: Option<serde_json::Value>,
    event: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IpcEvent {
    pub name: String,
    pub reason: Option<String>,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IpcClient {
    writer: Mutex<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>,
    pending: Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Option<serde_json::Value>, String>>>>>,
    next_id: AtomicI64,
}

impl IpcClient {
    /// Connects over a Unix domain socket, retrying `attempts` times with a
    /// fixed `delay` between attempts (the defaults the spec calls for are
    /// 20x100ms on Unix, 50x150ms on Windows). Returns the client plus the
    /// receiver for unsolicited events (e.g. `end-file`); the caller owns
    /// draining it, typically from a dedicated watcher task.
    #[cfg(unix)]
    pub async fn connect(
        socket_path: &Path,
        attempts: u32,
        delay: Duration,
    ) -> crate::Result<(Self, mpsc::Receiver<IpcEvent>)> {
        use tokio::net::UnixStream;

        let mut last_err = None;
        for _ in 0..attempts {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => return Ok(Self::from_stream(stream)),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(crate::PlayerError::IpcDisconnect(format!(
            "failed to connect to {}: {}",
            socket_path.display(),
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    #[cfg(windows)]
    pub async fn connect(
        socket_path: &Path,
        attempts: u32,
        delay: Duration,
    ) -> crate::Result<(Self, mpsc::Receiver<IpcEvent>)> {
        use tokio::net::windows::named_pipe::ClientOptions;

        let pipe_name = socket_path.to_string_lossy().to_string();
        let mut last_err = None;
        for _ in 0..attempts {
            match ClientOptions::new().open(&pipe_name) {
                Ok(pipe) => return Ok(Self::from_stream(pipe)),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(crate::PlayerError::IpcDisconnect(format!(
            "failed to connect to {pipe_name}: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn from_stream<S>(stream: S) -> (Self, mpsc::Receiver<IpcEvent>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let pending: Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Option<serde_json::Value>, String>>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::channel(64);

        let pending_reader = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Ok(frame) = serde_json::from_str::<IpcFrame>(&line) else {
                            tracing::debug!(%line, "unparseable ipc frame");
                            continue;
                        };
                        if let Some(request_id) = frame.request_id {
                            if let Some(tx) = pending_reader.lock().await.remove(&request_id) {
                                let result = match frame.error.as_deref() {
                                    Some("success") | None => Ok(frame.data),
                                    Some(other) => Err(other.to_string()),
                                };
                                let _ = tx.send(result);
                            }
                        } else if let Some(event) = frame.event {
                            let _ = events_tx
                                .send(IpcEvent {
                                    name: event,
                                    reason: frame.reason,
                                })
                                .await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "ipc read error");
                        break;
                    }
                }
            }
        });

        (
            Self {
                writer: Mutex::new(Box::new(write_half)),
                pending,
                next_id: AtomicI64::new(1),
            },
            events_rx,
        )
    }

    pub async fn command(&self, command: &[serde_json::Value]) -> crate::Result<Option<serde_json::Value>> {
        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        let request = IpcRequest { command, request_id };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| crate::PlayerError::Other(anyhow::anyhow!("failed to encode command: {e}")))?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| crate::PlayerError::IpcDisconnect(e.to_string()))?;
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(msg))) => Err(crate::PlayerError::Other(anyhow::anyhow!("ipc error: {msg}"))),
            Ok(Err(_)) => Err(crate::PlayerError::IpcDisconnect("connection closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(crate::PlayerError::IpcTimeout)
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_positional_command() {
        let request = IpcRequest {
            command: &[serde_json::json!("set_property"), serde_json::json!("pause"), serde_json::json!(true)],
            request_id: 7,
        };
        let encoded = serde_json::to_string(&request).unwrap();
        assert!(encoded.contains("\"request_id\":7"));
        assert!(encoded.contains("\"command\":["));
    }
}
