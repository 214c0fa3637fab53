//! External collaborator contract: turns user-provided input into a
//! `TrackDescriptor`, and later into a local file, without the core knowing
//! anything about search engines, chat adapters, or download tools.

use crate::Result;
use async_trait::async_trait;
use cueline_core::TrackDescriptor;
use std::path::PathBuf;

/// Download phase reported through a progress sink while `fetch_artifact`
/// runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Downloading,
    Converting,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub phase: ProgressPhase,
    pub percent: u8,
}

/// Receives progress updates while `fetch_artifact` runs. A plain closure,
/// matching the teacher's `Arc<dyn Fn(u64) + Send + Sync>` progress
/// callback shape.
pub type ProgressSink = Box<dyn Fn(Progress) + Send + Sync>;

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves freeform input (a URL, a search string, a playlist
    /// reference) into a descriptor. For a playlist, returns the first
    /// descriptor; further items surface through `resolve_playlist`.
    async fn resolve(&self, input: &str) -> Result<TrackDescriptor>;

    /// Resolves a playlist reference into all its member descriptors, the
    /// first of which is identical to what `resolve` would return.
    async fn resolve_playlist(&self, input: &str) -> Result<Vec<TrackDescriptor>> {
        Ok(vec![self.resolve(input).await?])
    }

    /// Downloads the artifact for `descriptor`, reporting progress through
    /// `sink`. Idempotent: if a valid local copy already exists, returns
    /// immediately without re-downloading.
    async fn fetch_artifact(
        &self,
        descriptor: &TrackDescriptor,
        sink: ProgressSink,
    ) -> Result<PathBuf>;
}
