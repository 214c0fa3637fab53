//! Ordered sequence with VIP-priority, dedup, reorder, and removal.
//!
//! Grounded on the teacher's `PlaylistManager` read/write-lock-guarded
//! mutation pattern, restructured around the three-class priority ordering
//! this system needs instead of the teacher's flat FIFO playlist.

use cueline_core::{CoreError, EventBus, Priority, QueueItem, Result, Topic};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

pub struct QueueManager {
    items: RwLock<Vec<QueueItem>>,
    next_seq: AtomicU64,
    bus: EventBus,
}

impl QueueManager {
    pub fn new(bus: EventBus) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            bus,
        }
    }

    pub async fn restore(&self, items: Vec<QueueItem>) {
        let max_seq = items.iter().map(|i| i.added_at).max().unwrap_or(0);
        self.next_seq.store(max_seq + 1, Ordering::SeqCst);
        *self.items.write().await = items;
    }

    /// Inserts at the tail of `item.priority`'s class (head, for `System`).
    /// Emits `QUEUE_ITEM_ADDED` then `QUEUE_UPDATED`.
    pub async fn add(&self, mut item: QueueItem) -> Result<()> {
        let mut items = self.items.write().await;
        if items.iter().any(|existing| existing.descriptor.id == item.descriptor.id) {
            return Err(CoreError::DuplicateRequest(item.descriptor.id));
        }

        item.added_at = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let index = insertion_index(&items, item.priority);
        let descriptor_id = item.descriptor.id.clone();
        items.insert(index, item);
        drop(items);

        self.bus.publish(Topic::QueueItemAdded { descriptor_id });
        self.bus.publish(Topic::QueueUpdated);
        Ok(())
    }

    /// Reserved for system-priority insertions: places `item` at the
    /// absolute head regardless of its declared priority.
    pub async fn add_first(&self, mut item: QueueItem) -> Result<()> {
        let mut items = self.items.write().await;
        if items.iter().any(|existing| existing.descriptor.id == item.descriptor.id) {
            return Err(CoreError::DuplicateRequest(item.descriptor.id));
        }

        item.added_at = self.next_seq.fetch_add(1, Ordering::SeqCst);
        item.priority = Priority::System;
        let descriptor_id = item.descriptor.id.clone();
        items.insert(0, item);
        drop(items);

        self.bus.publish(Topic::QueueItemAdded { descriptor_id });
        self.bus.publish(Topic::QueueUpdated);
        Ok(())
    }

    /// Emits `QUEUE_ITEM_REMOVED` and `QUEUE_UPDATED`.
    pub async fn remove(&self, index: usize) -> Result<QueueItem> {
        let mut items = self.items.write().await;
        if index >= items.len() {
            return Err(CoreError::OutOfRange(format!("index {index} out of range")));
        }
        let removed = items.remove(index);
        drop(items);

        self.bus.publish(Topic::QueueItemRemoved {
            descriptor_id: removed.descriptor.id.clone(),
        });
        self.bus.publish(Topic::QueueUpdated);
        Ok(removed)
    }

    /// Rejects moves that would cross priority-class boundaries. Indices
    /// are re-validated under the lock to resolve races.
    pub async fn reorder(&self, from_index: usize, to_index: usize) -> Result<()> {
        let mut items = self.items.write().await;
        if from_index >= items.len() || to_index >= items.len() {
            return Err(CoreError::OutOfRange(format!(
                "from {from_index} or to {to_index} out of range"
            )));
        }

        let priority = items[from_index].priority;
        let class_indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.priority == priority)
            .map(|(i, _)| i)
            .collect();
        let lo = *class_indices.first().unwrap();
        let hi = *class_indices.last().unwrap();
        if to_index < lo || to_index > hi {
            return Err(CoreError::InvalidMove(format!(
                "index {to_index} crosses priority class boundary [{lo}, {hi}]"
            )));
        }

        let item = items.remove(from_index);
        items.insert(to_index, item);
        drop(items);

        self.bus.publish(Topic::QueueReordered);
        self.bus.publish(Topic::QueueUpdated);
        Ok(())
    }

    pub async fn clear(&self) {
        self.items.write().await.clear();
        self.bus.publish(Topic::QueueCleared);
        self.bus.publish(Topic::QueueUpdated);
    }

    pub async fn peek(&self) -> Option<QueueItem> {
        self.items.read().await.first().cloned()
    }

    pub async fn pop(&self) -> Option<QueueItem> {
        let mut items = self.items.write().await;
        if items.is_empty() {
            None
        } else {
            let item = items.remove(0);
            drop(items);
            self.bus.publish(Topic::QueueUpdated);
            Some(item)
        }
    }

    pub async fn snapshot(&self) -> Vec<QueueItem> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Updates the download state of the item with the given descriptor id,
    /// if still present. Returns whether an item was found.
    pub async fn set_download_state(&self, descriptor_id: &str, state: cueline_core::DownloadState) -> bool {
        let mut items = self.items.write().await;
        if let Some(item) = items.iter_mut().find(|i| i.descriptor.id == descriptor_id) {
            item.download_state = state;
            drop(items);
            self.bus.publish(Topic::QueueUpdated);
            true
        } else {
            false
        }
    }
}

fn insertion_index(items: &[QueueItem], priority: Priority) -> usize {
    match priority {
        Priority::System => 0,
        Priority::Vip => {
            items
                .iter()
                .take_while(|i| i.priority == Priority::System || i.priority == Priority::Vip)
                .count()
        }
        Priority::Normal => items.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueline_core::{DownloadState, TrackDescriptor, TrackKind};

    fn item(url: &str, priority: Priority) -> QueueItem {
        QueueItem::new(TrackDescriptor::new(url, TrackKind::Remote), "alice", "chat", priority, 0)
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected() {
        let q = QueueManager::new(EventBus::new());
        q.add(item("https://example.com/a", Priority::Normal)).await.unwrap();
        let err = q.add(item("https://example.com/a", Priority::Normal)).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateRequest(_)));
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test]
    async fn vip_items_precede_normal_items() {
        let q = QueueManager::new(EventBus::new());
        q.add(item("https://example.com/normal-a", Priority::Normal)).await.unwrap();
        q.add(item("https://example.com/normal-b", Priority::Normal)).await.unwrap();
        q.add(item("https://example.com/vip-v", Priority::Vip)).await.unwrap();

        let snapshot = q.snapshot().await;
        assert_eq!(snapshot[0].descriptor.source_uri, "https://example.com/vip-v");
        assert_eq!(snapshot[1].descriptor.source_uri, "https://example.com/normal-a");
        assert_eq!(snapshot[2].descriptor.source_uri, "https://example.com/normal-b");
    }

    #[tokio::test]
    async fn system_items_occupy_head() {
        let q = QueueManager::new(EventBus::new());
        q.add(item("https://example.com/normal-a", Priority::Normal)).await.unwrap();
        q.add_first(item("https://example.com/sys", Priority::Normal)).await.unwrap();

        let snapshot = q.snapshot().await;
        assert_eq!(snapshot[0].descriptor.source_uri, "https://example.com/sys");
        assert_eq!(snapshot[0].priority, Priority::System);
    }

    #[tokio::test]
    async fn reorder_across_priority_classes_is_rejected() {
        let q = QueueManager::new(EventBus::new());
        q.add(item("https://example.com/vip-v", Priority::Vip)).await.unwrap();
        q.add(item("https://example.com/normal-b", Priority::Normal)).await.unwrap();

        let err = q.reorder(1, 0).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidMove(_)));
        let snapshot = q.snapshot().await;
        assert_eq!(snapshot[0].descriptor.source_uri, "https://example.com/vip-v");
    }

    #[tokio::test]
    async fn remove_out_of_range_is_rejected() {
        let q = QueueManager::new(EventBus::new());
        let err = q.remove(0).await.unwrap_err();
        assert!(matches!(err, CoreError::OutOfRange(_)));
    }

    #[tokio::test]
    async fn set_download_state_updates_matching_item() {
        let q = QueueManager::new(EventBus::new());
        let track = item("https://example.com/a", Priority::Normal);
        let id = track.descriptor.id.clone();
        q.add(track).await.unwrap();
        assert!(q.set_download_state(&id, DownloadState::Ready("/tmp/a".into())).await);
        let snapshot = q.snapshot().await;
        assert_eq!(snapshot[0].download_state, DownloadState::Ready("/tmp/a".into()));
    }
}
