use std::{
    io::{self, Read, Write},
    net::TcpStream,
    sync::Mutex,
};

use thiserror::Error;
use tracing::warn;

/// Transport-fatal errors (§7 "Transport fatal"): the owning task must
/// abort and the containing router enters degraded shutdown.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("peer closed connection")]
    PeerClosed,
}

/// Outcome of a single `recv_items` call.
pub enum RecvOutcome {
    /// `n` whole items were assembled and written to the caller's buffer.
    Items(usize),
    /// The peer closed its end in an orderly fashion (`recv == 0`).
    Closed,
}

struct RecvState {
    stream: TcpStream,
    /// Leftover bytes from a previous read that didn't complete a whole
    /// item; prepended to the next read before item-counting.
    residue: Vec<u8>,
}

/// One TCP connection to a single peer (root-facing if owned by a child,
/// child-facing if owned by the root), item-aligned per §4.1.
///
/// Send and recv each go through their own connection clone and their own
/// mutex, matching §5's "each transport's send direction is mutex-guarded;
/// each transport's recv direction is mutex-guarded (two distinct
/// mutexes)". In this design only one task ever calls each direction, so
/// contention is nonexistent — the mutexes exist to make that a checked
/// invariant rather than an assumption.
pub(crate) struct PeerStream {
    item_size: usize,
    send: Mutex<TcpStream>,
    recv: Mutex<RecvState>,
}

impl PeerStream {
    pub(crate) fn new(stream: TcpStream, item_size: usize) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let recv_stream = stream.try_clone()?;
        Ok(Self {
            item_size,
            send: Mutex::new(stream),
            recv: Mutex::new(RecvState { stream: recv_stream, residue: Vec::new() }),
        })
    }

    /// Writes `bytes` until fully delivered or a fatal error occurs.
    /// Retries on `Interrupted`.
    pub(crate) fn send(&self, bytes: &[u8]) -> Result<usize, TransportError> {
        let mut stream = self.send.lock().unwrap_or_else(|e| e.into_inner());
        let mut written = 0;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => return Err(TransportError::PeerClosed),
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(written)
    }

    /// Reads exactly `buf.len()` bytes (used for the fixed 12-byte header
    /// and the 4-byte weight footer, which aren't part of the item-aligned
    /// payload stream). Retries on `Interrupted`. Returns `Ok(false)` on an
    /// orderly close observed before any byte of this read lands.
    pub(crate) fn recv_exact(&self, buf: &mut [u8]) -> Result<bool, TransportError> {
        let mut guard = self.recv.lock().unwrap_or_else(|e| e.into_inner());
        let RecvState { stream, residue } = &mut *guard;

        let mut have = 0;
        if !residue.is_empty() {
            let take = residue.len().min(buf.len());
            buf[..take].copy_from_slice(&residue[..take]);
            residue.drain(..take);
            have = take;
        }

        while have < buf.len() {
            match stream.read(&mut buf[have..]) {
                Ok(0) => return if have == 0 { Ok(false) } else { Err(TransportError::PeerClosed) },
                Ok(n) => have += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(true)
    }

    /// Reads at least one item, then returns the item count.
    ///
    /// Keeps issuing underlying `read`s (beyond what's needed to drain any
    /// carried-over residue) until at least one whole item is assembled or
    /// the peer closes, combines that with the residue left from the
    /// previous call, and reports how many whole items are now present in
    /// `buf`. A single read can land as little as one byte under TCP
    /// fragmentation, so this must not give up after the first `read` the
    /// way a naive implementation would. Any leftover tail bytes that
    /// don't complete another item are stashed back into the residue
    /// buffer for the next call.
    pub(crate) fn recv_items(
        &self,
        buf: &mut [u8],
        n_items: usize,
    ) -> Result<RecvOutcome, TransportError> {
        let want_bytes = n_items * self.item_size;
        assert!(buf.len() >= want_bytes, "recv_items: buffer too small for n_items");

        let mut guard = self.recv.lock().unwrap_or_else(|e| e.into_inner());
        let RecvState { stream, residue } = &mut *guard;

        let mut have = 0;
        if !residue.is_empty() {
            let take = residue.len().min(want_bytes);
            buf[..take].copy_from_slice(&residue[..take]);
            residue.drain(..take);
            have = take;
        }

        while have < self.item_size {
            match stream.read(&mut buf[have..want_bytes]) {
                Ok(0) => {
                    return if have == 0 {
                        Ok(RecvOutcome::Closed)
                    } else {
                        warn!(have, "tcp: peer closed mid-item");
                        Err(TransportError::PeerClosed)
                    };
                }
                Ok(n) => have += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        let whole_items = have / self.item_size;
        let consumed = whole_items * self.item_size;
        if consumed < have {
            residue.extend_from_slice(&buf[consumed..have]);
        }

        Ok(RecvOutcome::Items(whole_items))
    }

    pub(crate) fn shutdown(&self) {
        if let Ok(stream) = self.send.lock() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
