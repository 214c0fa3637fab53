//! Uniform player contract driving one of two external processes.

use crate::Result;
use async_trait::async_trait;
use cueline_core::FinishReason;
use std::path::Path;

#[async_trait]
pub trait PlayerAdapter: Send + Sync {
    /// Begins playback; resolves only when playback ends, for any reason.
    /// `play` calls `stop` on any previous invocation first: exactly one
    /// subprocess exists per adapter instance.
    async fn play(&self, file_path: &Path, start_offset_ms: u64) -> Result<FinishReason>;

    /// Terminates the subprocess and releases IPC resources. Idempotent.
    async fn stop(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn seek(&self, position_ms: u64) -> Result<()>;
    async fn get_position(&self) -> Result<u64>;

    async fn set_volume(&self, volume: u8) -> Result<()>;
    async fn get_volume(&self) -> Result<u8>;

    /// Applies the current externally-provided filter-chain string.
    async fn update_filters(&self, filter_chain: &str) -> Result<()>;

    fn is_playing(&self) -> bool;

    /// `"primary"` for the seamless back-end, `"fallback"` for the restart
    /// back-end.
    fn name(&self) -> &'static str;
}
