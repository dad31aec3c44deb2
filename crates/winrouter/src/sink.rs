use std::{collections::VecDeque, sync::Arc, thread, time::Duration};

use tracing::warn;
use winrouter_queue::WindowQueue;
use winrouter_utils::safe_assert_eq;

use crate::{config::RouterConfig, record::WindowRecord};

const PUSH_RETRY_ATTEMPTS: usize = 10;
const PUSH_RETRY_SLEEP: Duration = Duration::from_micros(10);

/// An index tag harvested from the upstream stream: `index` is the tagged
/// value, `offset` is the item offset within the current batch it applies
/// to (§3 "Index-tag bag", §4.3).
#[derive(Debug, Clone, Copy)]
pub struct IndexTag {
    pub offset: usize,
    pub index: u64,
}

/// Converts a stream of items into fixed-size `DATA` windows and pushes
/// them onto the input queue (§4.3).
pub struct QueueSink {
    queue: Arc<WindowQueue<WindowRecord>>,
    item_size: usize,
    window_len: usize,
    preserve_index: bool,
    next_index: u64,
    /// A record that failed to push after `PUSH_RETRY_ATTEMPTS` retries;
    /// re-attempted before any new work on the next call (§4.3 step 3).
    pending: Option<WindowRecord>,
}

impl QueueSink {
    pub fn new(queue: Arc<WindowQueue<WindowRecord>>, config: &RouterConfig) -> Self {
        Self {
            queue,
            item_size: config.item_size(),
            window_len: config.window_len(),
            preserve_index: config.preserve_index(),
            next_index: 0,
            pending: None,
        }
    }

    /// Processes one work-batch (§4.3 algorithm). `batch` must be a whole
    /// multiple of `window_len * item_size` bytes. `tags`, when
    /// `preserve_index` is set, carries index tags in ascending offset
    /// order for this batch; offsets not covered by a tag fall back to the
    /// sink's own monotonic counter. Returns the number of *items*
    /// consumed — 0 signals backpressure to the caller.
    pub fn process_batch(&mut self, batch: &[u8], mut tags: VecDeque<IndexTag>) -> usize {
        if let Some(pending) = self.pending.take() {
            if let Some(bounced) = self.try_push(pending) {
                self.pending = Some(bounced);
                return 0;
            }
        }

        let window_bytes = self.window_len * self.item_size;
        safe_assert_eq!(batch.len() % window_bytes, 0, "batch not window-aligned");

        let mut consumed = 0;
        for (w, chunk) in batch.chunks(window_bytes).enumerate() {
            let item_offset = w * self.window_len;
            let index = self.next_record_index(&mut tags, item_offset);
            let record = WindowRecord::data(index as u32, chunk.to_vec());
            if let Some(bounced) = self.try_push(record) {
                self.pending = Some(bounced);
                break;
            }
            consumed += self.window_len;
        }
        consumed
    }

    fn next_record_index(&mut self, tags: &mut VecDeque<IndexTag>, batch_offset: usize) -> u64 {
        if self.preserve_index {
            if matches!(tags.front(), Some(tag) if tag.offset == batch_offset) {
                return tags.pop_front().unwrap().index;
            }
            warn!(
                batch_offset,
                "queue-sink: index tag bag empty while preserving index, falling back to counter"
            );
        }
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn try_push(&self, mut record: WindowRecord) -> Option<WindowRecord> {
        for _ in 0..PUSH_RETRY_ATTEMPTS {
            match self.queue.push(record) {
                None => return None,
                Some(bounced) => {
                    record = bounced;
                    thread::sleep(PUSH_RETRY_SLEEP);
                }
            }
        }
        Some(record)
    }

    /// Pushes a KILL record, retrying indefinitely until accepted (§4.3
    /// step 4, "blocking until accepted").
    fn push_kill_blocking(&self) {
        let mut record = WindowRecord::kill();
        loop {
            match self.queue.push(record) {
                None => return,
                Some(bounced) => {
                    record = bounced;
                    thread::sleep(PUSH_RETRY_SLEEP);
                }
            }
        }
    }
}

impl Drop for QueueSink {
    fn drop(&mut self) {
        self.push_kill_blocking();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn items(vals: &[u8]) -> Vec<u8> {
        vals.to_vec()
    }

    #[test]
    fn emits_one_window_per_w_items_with_counter_index() {
        let queue = Arc::new(WindowQueue::new(8).unwrap());
        let config = RouterConfig::new(1, 4).unwrap();
        let mut sink = QueueSink::new(queue.clone(), &config);

        let consumed = sink.process_batch(&items(&[0, 1, 2, 3, 4, 5, 6, 7]), VecDeque::new());
        assert_eq!(consumed, 8);

        let first = queue.pop().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.payload, vec![0, 1, 2, 3]);
        let second = queue.pop().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.payload, vec![4, 5, 6, 7]);
    }

    #[test]
    fn preserve_index_uses_tag_then_falls_back_to_counter() {
        let queue = Arc::new(WindowQueue::new(8).unwrap());
        let config = RouterConfig::new(1, 4).unwrap().with_preserve_index(true);
        let mut sink = QueueSink::new(queue.clone(), &config);

        let mut tags = VecDeque::new();
        tags.push_back(IndexTag { offset: 0, index: 42 });
        sink.process_batch(&items(&[0, 1, 2, 3, 4, 5, 6, 7]), tags);

        let first = queue.pop().unwrap();
        assert_eq!(first.index, 42);
        // second window's tag was missing: falls back to the counter (0).
        let second = queue.pop().unwrap();
        assert_eq!(second.index, 0);
    }

    #[test]
    fn full_queue_retains_pending_and_reports_backpressure() {
        let queue = Arc::new(WindowQueue::new(1).unwrap());
        let config = RouterConfig::new(1, 4).unwrap();
        let mut sink = QueueSink::new(queue.clone(), &config);

        let consumed = sink.process_batch(&items(&[0, 1, 2, 3, 4, 5, 6, 7]), VecDeque::new());
        assert_eq!(consumed, 4, "only the first window should have fit");

        // draining the queue lets the pending second window go through on
        // the next call, ahead of any new work.
        let first = queue.pop().unwrap();
        assert_eq!(first.index, 0);

        let consumed = sink.process_batch(&items(&[]), VecDeque::new());
        assert_eq!(consumed, 0, "empty batch consumes nothing new");
        let second = queue.pop().unwrap();
        assert_eq!(second.index, 1);
    }

    #[test]
    fn drop_pushes_kill() {
        let queue = Arc::new(WindowQueue::new(2).unwrap());
        let config = RouterConfig::new(1, 4).unwrap();
        {
            let _sink = QueueSink::new(queue.clone(), &config);
        }
        let record = queue.pop().unwrap();
        assert!(record.is_kill());
    }
}
