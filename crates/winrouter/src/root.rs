use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, info, info_span, warn};
use winrouter_queue::WindowQueue;
use winrouter_transport::FramedTransport;
use winrouter_utils::{ThreadPriority, thread_boot};

use crate::{
    config::RouterConfig,
    record::WindowRecord,
    throughput::{self, Limiter},
    weight::WeightTable,
    wire::{self, Incoming},
};

const QUEUE_PUSH_SLEEP: Duration = Duration::from_micros(10);
const QUEUE_POP_SLEEP: Duration = Duration::from_millis(1);

fn blocking_push(queue: &WindowQueue<WindowRecord>, mut record: WindowRecord) {
    loop {
        match queue.push(record) {
            None => return,
            Some(bounced) => {
                record = bounced;
                thread::sleep(QUEUE_PUSH_SLEEP);
            }
        }
    }
}

/// The producer host's network front-end (§4.6): one shared sender task
/// (`in_queue` → least-loaded child) and one receive task per child
/// (child → `out_queue`), plus the weight table driving load balancing.
pub struct RootRouter {
    weights: Arc<WeightTable>,
    stop: Arc<AtomicBool>,
    sender: Option<JoinHandle<()>>,
    receivers: Vec<JoinHandle<()>>,
}

impl RootRouter {
    pub fn spawn(
        transport: Arc<FramedTransport>,
        in_queue: Arc<WindowQueue<WindowRecord>>,
        out_queue: Arc<WindowQueue<WindowRecord>>,
        config: &RouterConfig,
    ) -> Self {
        let item_size = config.item_size();
        let throughput_limit = config.throughput_limit();
        let n = transport.n_peers();
        let weights = Arc::new(WeightTable::new(n));
        let stop = Arc::new(AtomicBool::new(false));
        let n_killed = Arc::new(AtomicU32::new(0));

        let sender = {
            let transport = transport.clone();
            let weights = weights.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let _span = info_span!("root-send").entered();
                thread_boot(None, ThreadPriority::OSDefault);
                let limiter = throughput::build_limiter(throughput_limit);
                sender_loop(&transport, &in_queue, &weights, &stop, item_size, n, limiter.as_ref());
            })
        };

        let receivers = (0..n)
            .map(|i| {
                let transport = transport.clone();
                let out_queue = out_queue.clone();
                let weights = weights.clone();
                let stop = stop.clone();
                let n_killed = n_killed.clone();
                thread::spawn(move || {
                    let _span = info_span!("root-receive", child = i).entered();
                    thread_boot(None, ThreadPriority::OSDefault);
                    receiver_loop(&transport, &out_queue, &weights, &stop, &n_killed, i, n, item_size);
                })
            })
            .collect();

        Self { weights, stop, sender: Some(sender), receivers }
    }

    /// Current per-child weights, lowest index first (§3 "Weight table").
    pub fn weights(&self) -> Vec<u32> {
        self.weights.snapshot()
    }

    /// Sum of per-child weights: windows dispatched but not yet returned.
    pub fn global_in_flight(&self) -> u64 {
        self.weights.global_in_flight()
    }
}

impl Drop for RootRouter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.sender.take() {
            let _ = h.join();
        }
        for h in self.receivers.drain(..) {
            let _ = h.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn sender_loop(
    transport: &FramedTransport,
    in_queue: &WindowQueue<WindowRecord>,
    weights: &WeightTable,
    stop: &AtomicBool,
    item_size: usize,
    n_children: usize,
    limiter: Option<&Limiter>,
) {
    while !stop.load(Ordering::Relaxed) {
        let Some(record) = in_queue.pop() else {
            thread::sleep(QUEUE_POP_SLEEP);
            continue;
        };

        if record.is_kill() {
            debug!("root: dispatching KILL to all children");
            for i in 0..n_children {
                if let Err(e) = wire::send_record(transport, i, &record, item_size, None) {
                    warn!(error = %e, child = i, "root: transport error sending KILL");
                }
            }
            return;
        }

        if let Some(limiter) = limiter {
            throughput::throttle(limiter);
        }

        let target = weights.argmin();
        if let Err(e) = wire::send_record(transport, target, &record, item_size, None) {
            warn!(error = %e, child = target, "root: transport error on send, aborting sender");
            return;
        }
        weights.bump_on_dispatch(target, 1);
    }
}

#[allow(clippy::too_many_arguments)]
fn receiver_loop(
    transport: &FramedTransport,
    out_queue: &WindowQueue<WindowRecord>,
    weights: &WeightTable,
    stop: &AtomicBool,
    n_killed: &AtomicU32,
    child: usize,
    n_children: usize,
    item_size: usize,
) {
    while !stop.load(Ordering::Relaxed) {
        match wire::recv_record(transport, child, item_size) {
            Ok(Incoming::Data { record }) => {
                let reported = record.weight.unwrap_or(0);
                weights.set_authoritative(child, reported, 1);
                blocking_push(out_queue, record);
            }
            Ok(Incoming::KillAck) => {
                let killed = n_killed.fetch_add(1, Ordering::Relaxed) + 1;
                info!(child, killed, n_children, "root: child acknowledged shutdown");
                if killed as usize == n_children {
                    blocking_push(out_queue, WindowRecord::kill());
                }
                return;
            }
            Ok(Incoming::Kill) => {
                warn!(child, "root: unexpected KILL from child, ignoring");
            }
            Ok(Incoming::Unsupported(kind)) => {
                warn!(child, kind, "root: got unsupported message kind, ignoring");
            }
            Ok(Incoming::Closed) => {
                info!(child, "root: child closed connection");
                return;
            }
            Err(e) => {
                warn!(error = %e, child, "root: transport error on receive, aborting");
                return;
            }
        }
    }
}
