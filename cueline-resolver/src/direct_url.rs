//! Minimal `Resolver` that treats its input as a literal HTTP(S) URL.
//!
//! Stands in for the chat/search/yt-dlp resolver the playback core treats as
//! an external collaborator: it exists so the rest of the system can be
//! exercised end-to-end without a real resolver wired in, through the exact
//! same trait boundary a production resolver would use.

use crate::error::ResolveError;
use crate::traits::{Progress, ProgressPhase, ProgressSink, Resolver};
use crate::Result;
use async_trait::async_trait;
use cueline_core::{TrackDescriptor, TrackKind};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub struct DirectUrlResolver {
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl DirectUrlResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_dir: cache_dir.into(),
        }
    }

    fn artifact_path(&self, descriptor: &TrackDescriptor) -> PathBuf {
        let ext = Path::new(&descriptor.source_uri)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        self.cache_dir.join(format!("{}.{}", descriptor.id, ext))
    }

    fn classify(err: &reqwest::Error) -> ResolveError {
        if let Some(status) = err.status() {
            if status.as_u16() == 404 || status.as_u16() == 410 || status.as_u16() == 451 {
                return ResolveError::PermanentRejected(format!("source returned {status}"));
            }
        }
        ResolveError::TransientNetwork(err.to_string())
    }
}

#[async_trait]
impl Resolver for DirectUrlResolver {
    async fn resolve(&self, input: &str) -> Result<TrackDescriptor> {
        let url = reqwest::Url::parse(input)
            .map_err(|e| ResolveError::NotResolvable(format!("not a URL: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ResolveError::NotResolvable(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let mut descriptor = TrackDescriptor::new(input, TrackKind::Remote);
        descriptor.title = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_string();

        match self.client.head(url.clone()).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Some(len) = resp.content_length() {
                    descriptor.duration_ms = None;
                    tracing::debug!(content_length = len, %input, "resolved direct url");
                }
            }
            Ok(resp) => {
                let status = resp.status();
                if status.as_u16() == 404 || status.as_u16() == 410 {
                    return Err(ResolveError::PermanentRejected(format!(
                        "source returned {status}"
                    )));
                }
            }
            Err(e) => return Err(Self::classify(&e)),
        }

        Ok(descriptor)
    }

    async fn fetch_artifact(
        &self,
        descriptor: &TrackDescriptor,
        sink: ProgressSink,
    ) -> Result<PathBuf> {
        let path = self.artifact_path(descriptor);

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.len() > 0 {
                sink(Progress {
                    phase: ProgressPhase::Complete,
                    percent: 100,
                });
                return Ok(path);
            }
        }

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| ResolveError::Other(anyhow::anyhow!("failed to create cache dir: {e}")))?;

        let response = self
            .client
            .get(&descriptor.source_uri)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(if status.as_u16() == 404 || status.as_u16() == 410 {
                ResolveError::PermanentRejected(format!("source returned {status}"))
            } else {
                ResolveError::TransientNetwork(format!("source returned {status}"))
            });
        }

        let total = response.content_length();
        let tmp_path = path.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| ResolveError::Other(anyhow::anyhow!("failed to create file: {e}")))?;

        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::classify(&e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ResolveError::Other(anyhow::anyhow!("failed to write chunk: {e}")))?;
            received += chunk.len() as u64;
            let percent = total
                .map(|t| ((received as f64 / t as f64) * 100.0) as u8)
                .unwrap_or(0);
            sink(Progress {
                phase: ProgressPhase::Downloading,
                percent: percent.min(99),
            });
        }
        file.flush()
            .await
            .map_err(|e| ResolveError::Other(anyhow::anyhow!("failed to flush file: {e}")))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ResolveError::Other(anyhow::anyhow!("failed to finalize file: {e}")))?;

        sink(Progress {
            phase: ProgressPhase::Complete,
            percent: 100,
        });

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DirectUrlResolver::new(dir.path());
        let err = resolver.resolve("ftp://example.com/a.mp3").await.unwrap_err();
        assert!(matches!(err, ResolveError::NotResolvable(_)));
    }

    #[tokio::test]
    async fn rejects_unparseable_input() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DirectUrlResolver::new(dir.path());
        let err = resolver.resolve("not a url at all").await.unwrap_err();
        assert!(matches!(err, ResolveError::NotResolvable(_)));
    }
}
