//! Bounded-concurrency pre-materialization of upcoming queue items.
//!
//! Grounded on the teacher's `Cache::ensure_from_url` (check-then-download),
//! extended with the two things it doesn't need: a semaphore bounding
//! concurrent fetches to `K` slots, and a single-flight map so concurrent
//! callers for the same `descriptor.id` share one underlying fetch instead
//! of each kicking off their own.

use crate::error::DownloadError;
use crate::retry::RetryPolicy;
use cueline_core::{EventBus, Topic, TrackDescriptor};
use cueline_resolver::{Progress, ProgressPhase, Resolver};
use futures::future::{FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

type SharedFetch = Shared<Pin<Box<dyn Future<Output = std::result::Result<PathBuf, Arc<DownloadError>>> + Send>>>;

pub struct Downloader {
    resolver: Arc<dyn Resolver>,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    bus: EventBus,
    inflight: Mutex<HashMap<String, SharedFetch>>,
}

impl Downloader {
    pub fn new(resolver: Arc<dyn Resolver>, concurrency: usize, retry: RetryPolicy, bus: EventBus) -> Self {
        Self {
            resolver,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            retry,
            bus,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Background fetch: waits for a free concurrency slot. Used by the
    /// look-ahead pipeline.
    pub async fn fetch_background(&self, descriptor: &TrackDescriptor) -> crate::Result<PathBuf> {
        self.fetch(descriptor, true).await
    }

    /// Foreground fetch: bypasses the semaphore so the currently-playing
    /// item is never stuck behind look-ahead slots.
    pub async fn fetch_foreground(&self, descriptor: &TrackDescriptor) -> crate::Result<PathBuf> {
        self.fetch(descriptor, false).await
    }

    async fn fetch(&self, descriptor: &TrackDescriptor, bounded: bool) -> crate::Result<PathBuf> {
        let shared = {
            let mut inflight = self.inflight.lock().unwrap();
            if let Some(existing) = inflight.get(&descriptor.id) {
                existing.clone()
            } else {
                let fut = Self::run_fetch(
                    self.resolver.clone(),
                    if bounded { Some(self.semaphore.clone()) } else { None },
                    self.retry,
                    self.bus.clone(),
                    descriptor.clone(),
                );
                let shared: SharedFetch = Box::pin(fut).shared();
                inflight.insert(descriptor.id.clone(), shared.clone());
                shared
            }
        };

        let result = shared.await;
        self.inflight.lock().unwrap().remove(&descriptor.id);
        result.map_err(|err| clone_download_error(&err))
    }

    async fn run_fetch(
        resolver: Arc<dyn Resolver>,
        semaphore: Option<Arc<Semaphore>>,
        retry: RetryPolicy,
        bus: EventBus,
        descriptor: TrackDescriptor,
    ) -> std::result::Result<PathBuf, Arc<DownloadError>> {
        let _permit = match semaphore {
            Some(sem) => Some(sem.acquire_owned().await.expect("semaphore never closed")),
            None => None,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let descriptor_id = descriptor.id.clone();
            let sink: cueline_resolver::ProgressSink = Box::new(move |p: Progress| {
                if p.phase == ProgressPhase::Downloading {
                    tracing::trace!(track = %descriptor_id, percent = p.percent, "downloading");
                }
            });

            match resolver.fetch_artifact(&descriptor, sink).await {
                Ok(path) => {
                    bus.publish(Topic::QueueUpdated);
                    return Ok(path);
                }
                // Permanently unresolvable or no tool to resolve it with: retrying
                // can never change the outcome, so skip straight to terminal.
                Err(cueline_resolver::ResolveError::NotResolvable(msg)) => {
                    return Err(Arc::new(DownloadError::NotResolvable(msg)));
                }
                Err(cueline_resolver::ResolveError::PermanentRejected(msg)) => {
                    return Err(Arc::new(DownloadError::PermanentRejected(msg)));
                }
                Err(cueline_resolver::ResolveError::ToolUnavailable(msg)) => {
                    return Err(Arc::new(DownloadError::ToolUnavailable(msg)));
                }
                Err(err) => {
                    if attempt >= retry.max_attempts {
                        return Err(Arc::new(DownloadError::RetriesExhausted(err.to_string())));
                    }
                    tokio::time::sleep(retry.delay_for(attempt)).await;
                }
            }
        }
    }
}

/// `DownloadError` carries an `anyhow::Error` in its `Other` variant, which
/// isn't `Clone`; each single-flight caller needs its own owned error, so
/// rebuild one from the shared `Arc` by message rather than deriving `Clone`.
fn clone_download_error(err: &DownloadError) -> DownloadError {
    match err {
        DownloadError::NotResolvable(msg) => DownloadError::NotResolvable(msg.clone()),
        DownloadError::PermanentRejected(msg) => DownloadError::PermanentRejected(msg.clone()),
        DownloadError::ToolUnavailable(msg) => DownloadError::ToolUnavailable(msg.clone()),
        DownloadError::RetriesExhausted(msg) => DownloadError::RetriesExhausted(msg.clone()),
        DownloadError::Other(inner) => DownloadError::Other(anyhow::anyhow!(inner.to_string())),
    }
}
