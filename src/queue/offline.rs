//! Offline request buffer
//!
//! Holds requests issued while disconnected so they can be re-enqueued in one
//! batch when connectivity returns.

use crate::queue::request::{ApiRequest, Priority};

/// A request parked while offline.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    /// The opaque request payload.
    pub request: ApiRequest,
    /// Priority it was enqueued with; restored on drain.
    pub priority: Priority,
    /// Unix-millisecond timestamp when the request was buffered.
    pub buffered_at: i64,
}

/// Bounded buffer of not-yet-issued requests tagged with priority.
///
/// When full, a low-priority entry is evicted to make room; otherwise the
/// insertion is rejected. Not time-ordered for removal: [`OfflineQueue::drain`]
/// returns everything in one batch sorted by priority.
#[derive(Debug)]
pub struct OfflineQueue {
    entries: Vec<BufferedRequest>,
    max_size: usize,
}

impl OfflineQueue {
    /// Create a buffer holding at most `max_size` requests.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_size,
        }
    }

    /// Buffer a request.
    ///
    /// Returns false only when the buffer is full and contains no evictable
    /// low-priority entry.
    pub fn add(&mut self, request: ApiRequest, priority: Priority) -> bool {
        if self.entries.len() >= self.max_size {
            let evictable = self
                .entries
                .iter()
                .position(|e| e.priority == Priority::Low);
            match evictable {
                Some(idx) => {
                    let evicted = self.entries.remove(idx);
                    tracing::warn!(
                        url = %evicted.request.url,
                        "Offline buffer full: evicted low-priority request"
                    );
                }
                None => {
                    tracing::warn!(
                        capacity = self.max_size,
                        "Offline buffer full with no evictable entry; rejecting request"
                    );
                    return false;
                }
            }
        }

        self.entries.push(BufferedRequest {
            request,
            priority,
            buffered_at: chrono::Utc::now().timestamp_millis(),
        });
        true
    }

    /// Remove and return every buffered request, sorted high→normal→low.
    ///
    /// Insertion order is preserved within a tier. This is the recovery path
    /// invoked exactly once when connectivity is restored.
    pub fn drain(&mut self) -> Vec<BufferedRequest> {
        let mut drained: Vec<BufferedRequest> = self.entries.drain(..).collect();
        drained.sort_by_key(|e| e.priority);
        drained
    }

    /// Number of buffered requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
