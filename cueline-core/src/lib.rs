//! Shared domain types, error taxonomy, and event bus for the playback core.

pub mod error;
pub mod event;
pub mod model;

pub use error::{CoreError, Result};
pub use event::{Envelope, EventBus, FinishReason, Topic};
pub use model::{DownloadState, Phase, PlaybackSnapshot, Priority, QueueItem, TrackDescriptor, TrackKind};
