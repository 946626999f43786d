use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use crate::models::GenerationEvent;

pub const DEFAULT_FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    pub seq: u64,
    pub event: GenerationEvent,
}

/// Bounded, ordered record of lifecycle events for the presentation layer.
#[derive(Debug)]
pub struct EventFeed {
    next_seq: u64,
    capacity: usize,
    entries: VecDeque<FeedEntry>,
}

impl Default for EventFeed {
    fn default() -> Self { Self::with_capacity(DEFAULT_FEED_CAPACITY) }
}

impl EventFeed {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { next_seq: 1, capacity: capacity.max(1), entries: VecDeque::new() }
    }

    pub fn push(&mut self, event: GenerationEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(FeedEntry { seq, event });
        seq
    }

    /// Entries with a sequence number greater than `after`.
    pub fn since(&self, after: u64) -> Vec<FeedEntry> {
        self.entries.iter().filter(|e| e.seq > after).cloned().collect()
    }
}

/// Drains the controller's channel until every sender is gone.
pub async fn pump(mut rx: UnboundedReceiver<GenerationEvent>, feed: Arc<RwLock<EventFeed>>) {
    while let Some(event) = rx.recv().await {
        match &event {
            GenerationEvent::Started { job_id } => info!("⏳ [{}] in progress", job_id),
            GenerationEvent::Completed { job_id, result } => {
                info!("🎉 [{}] saved: {} ({} bytes)", job_id, result.file_name(), result.byte_length)
            }
            GenerationEvent::Failed { job_id, error } => {
                error!("💥 [{}] {:?}: {}", job_id, error.kind, error.message)
            }
        }
        feed.write().push(event);
    }
    info!("Event channel closed");
}
