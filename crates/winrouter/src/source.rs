use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tracing::warn;
use winrouter_queue::WindowQueue;
use winrouter_utils::safe_assert_eq;

use crate::{config::RouterConfig, record::WindowRecord};

/// Suggested backoff for a caller that just observed [`PollOutcome::Empty`]
/// (§4.4 step 1, §5 "on pop retry (sleep 100 µs)"). Not applied internally
/// so `poll` stays a pure, quickly-testable call.
pub const POP_RETRY_SLEEP: Duration = Duration::from_micros(100);

/// One item of downstream output: payload bytes plus, if preserving
/// index, the "i" stream tag to attach at the first item of the window
/// (§6 "stream-tag protocol").
#[derive(Debug, Clone)]
pub struct Emission {
    pub payload: Vec<u8>,
    pub index_tag: Option<u64>,
}

#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing ready this call.
    Empty,
    /// One window emitted.
    Emitted(Emission),
    /// KILL observed; the downstream stream terminates.
    EndOfStream,
}

/// Pops `DATA` windows from a queue and emits their payloads downstream,
/// optionally reordering by index (§4.4).
pub struct QueueSource {
    queue: Arc<WindowQueue<WindowRecord>>,
    preserve_index: bool,
    order: bool,
    expected_next: u64,
    /// Records awaiting `expected_next` to catch up, keyed by index (§3
    /// "Pending-reorder buffer"). Unbounded per §9 design notes.
    pending: BTreeMap<u64, WindowRecord>,
}

impl QueueSource {
    pub fn new(queue: Arc<WindowQueue<WindowRecord>>, config: &RouterConfig) -> Self {
        Self {
            queue,
            preserve_index: config.preserve_index(),
            order: config.order(),
            expected_next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// One downstream-demand call (§4.4 "Behavior"). Drains any
    /// now-ready, in-order record before touching the queue, then attempts
    /// one `pop`.
    pub fn poll(&mut self) -> PollOutcome {
        if self.order {
            if let Some(ready) = self.take_ready() {
                return self.emit(ready);
            }
        }

        let Some(record) = self.queue.pop() else {
            return PollOutcome::Empty;
        };

        if record.is_kill() {
            if self.order && !self.pending.is_empty() {
                warn!(
                    pending = self.pending.len(),
                    "queue-source: KILL observed with non-empty reorder buffer"
                );
            }
            return PollOutcome::EndOfStream;
        }

        if !self.order {
            return self.emit(record);
        }

        let index = u64::from(record.index);
        if index < self.expected_next || self.pending.contains_key(&index) {
            warn!(index, "queue-source: duplicate index in reorder mode, discarding");
            return PollOutcome::Empty;
        }
        self.pending.insert(index, record);

        match self.take_ready() {
            Some(ready) => self.emit(ready),
            None => PollOutcome::Empty,
        }
    }

    fn take_ready(&mut self) -> Option<WindowRecord> {
        self.pending.remove(&self.expected_next)
    }

    fn emit(&mut self, record: WindowRecord) -> PollOutcome {
        let index = u64::from(record.index);
        if self.order {
            safe_assert_eq!(index, self.expected_next);
            self.expected_next += 1;
        }
        let index_tag = self.preserve_index.then_some(index);
        PollOutcome::Emitted(Emission { payload: record.payload, index_tag })
    }
}
