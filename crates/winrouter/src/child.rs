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

/// The remote worker's network front-end (§4.5): one receive task
/// (parent → `in_queue`), one send task (`out_queue` → parent), and a
/// local in-flight counter reported upstream on every return.
pub struct ChildRouter {
    stop: Arc<AtomicBool>,
    receive: Option<JoinHandle<()>>,
    send: Option<JoinHandle<()>>,
}

impl ChildRouter {
    pub fn spawn(
        transport: Arc<FramedTransport>,
        in_queue: Arc<WindowQueue<WindowRecord>>,
        out_queue: Arc<WindowQueue<WindowRecord>>,
        config: &RouterConfig,
    ) -> Self {
        let item_size = config.item_size();
        let stop = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicU32::new(0));

        let receive = {
            let transport = transport.clone();
            let in_queue = in_queue.clone();
            let stop = stop.clone();
            let in_flight = in_flight.clone();
            thread::spawn(move || {
                let _span = info_span!("child-receive").entered();
                thread_boot(None, ThreadPriority::OSDefault);
                receive_loop(&transport, &in_queue, &in_flight, &stop, item_size);
            })
        };

        let send = {
            let stop = stop.clone();
            thread::spawn(move || {
                let _span = info_span!("child-send").entered();
                thread_boot(None, ThreadPriority::OSDefault);
                send_loop(&transport, &out_queue, &in_flight, &stop, item_size);
            })
        };

        Self { stop, receive: Some(receive), send: Some(send) }
    }
}

impl Drop for ChildRouter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.receive.take() {
            let _ = h.join();
        }
        if let Some(h) = self.send.take() {
            let _ = h.join();
        }
    }
}

fn receive_loop(
    transport: &FramedTransport,
    in_queue: &WindowQueue<WindowRecord>,
    in_flight: &AtomicU32,
    stop: &AtomicBool,
    item_size: usize,
) {
    while !stop.load(Ordering::Relaxed) {
        match wire::recv_record(transport, 0, item_size) {
            Ok(Incoming::Data { record }) => {
                in_flight.fetch_add(1, Ordering::Relaxed);
                blocking_push(in_queue, record);
            }
            Ok(Incoming::Kill) => {
                debug!("child: got KILL from parent");
                blocking_push(in_queue, WindowRecord::kill());
            }
            Ok(Incoming::KillAck) => {
                warn!("child: unexpected KILL_ACK from parent, ignoring");
            }
            Ok(Incoming::Unsupported(kind)) => {
                warn!(kind, "child: got unsupported message kind from parent, ignoring");
            }
            Ok(Incoming::Closed) => {
                info!("child: parent closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "child: transport error on receive, aborting");
                break;
            }
        }
    }
}

fn send_loop(
    transport: &FramedTransport,
    out_queue: &WindowQueue<WindowRecord>,
    in_flight: &AtomicU32,
    stop: &AtomicBool,
    item_size: usize,
) {
    while !stop.load(Ordering::Relaxed) {
        let Some(record) = out_queue.pop() else {
            thread::sleep(QUEUE_POP_SLEEP);
            continue;
        };

        let is_kill = record.is_kill();
        // Report the count still outstanding *after* this window, not
        // including it, so a fully-drained child reports back to 0 rather
        // than leaving a stale 1 behind (§8 "two-child load balance").
        let weight = if is_kill { 0 } else { in_flight.fetch_sub(1, Ordering::Relaxed) - 1 };

        if let Err(e) = wire::send_record(transport, 0, &record, item_size, Some(weight)) {
            warn!(error = %e, "child: transport error on send, aborting");
            break;
        }

        if is_kill {
            debug!("child: forwarded KILL_ACK, shutting down send task");
            stop.store(true, Ordering::Relaxed);
            // Unblocks the receive task's in-flight read: the parent sends
            // nothing further once every child has acked, so without this
            // the receive task would wait on the socket forever.
            transport.close();
            break;
        }
    }
}
