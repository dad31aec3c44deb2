use std::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::tcp::stream::{PeerStream, RecvOutcome, TransportError};

/// Item-aligned, blocking TCP transport between the root and its N
/// children (§4.1).
///
/// Each peer is identified by a dense `peer_id` in `0..n_peers`. On the
/// root side, `peer_id` is assigned by accept order (§6 "Connection
/// bringup"); on the child side there is exactly one peer, `0`, the
/// parent.
pub struct FramedTransport {
    item_size: usize,
    peers: Vec<PeerStream>,
}

impl FramedTransport {
    /// Binds `port` and accepts `n` inbound connections in order, indexed
    /// `0..n-1`.
    pub fn connect_as_root(n: usize, port: u16, item_size: usize) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        info!(port, n, "root: listening for children");

        let mut peers = Vec::with_capacity(n);
        for i in 0..n {
            let (stream, addr) = listener.accept()?;
            debug!(child = i, %addr, "root: child connected");
            peers.push(PeerStream::new(stream, item_size)?);
        }
        info!(n, "root: all children connected");
        Ok(Self { item_size, peers })
    }

    /// Blocking connect to the parent with retry (sleep 1s between
    /// attempts) until success.
    pub fn connect_as_child<A>(parent_addr: A, item_size: usize) -> std::io::Result<Self>
    where
        A: ToSocketAddrs + Clone,
    {
        loop {
            match TcpStream::connect(parent_addr.clone()) {
                Ok(stream) => {
                    info!("child: connected to parent");
                    let peer = PeerStream::new(stream, item_size)?;
                    return Ok(Self { item_size, peers: vec![peer] });
                }
                Err(e) => {
                    warn!(error = %e, "child: couldn't connect to parent, retrying in 1s");
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }

    #[inline]
    pub fn n_peers(&self) -> usize {
        self.peers.len()
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Writes until all bytes delivered or a fatal error occurs.
    pub fn send(&self, peer_id: usize, bytes: &[u8]) -> Result<usize, TransportError> {
        self.peers[peer_id].send(bytes)
    }

    /// Reads exactly `buf.len()` bytes — used for fixed-format framing
    /// (the 12-byte header, the 4-byte weight footer). Returns `false` on
    /// an orderly close observed before any byte of this read lands.
    pub fn recv_exact(&self, peer_id: usize, buf: &mut [u8]) -> Result<bool, TransportError> {
        self.peers[peer_id].recv_exact(buf)
    }

    /// Reads until at least one item is available, then returns the item
    /// count (see module docs for the residue rule). Returns `Ok(0)` only
    /// on an orderly peer close.
    pub fn recv_items(
        &self,
        peer_id: usize,
        buf: &mut [u8],
        n_items: usize,
    ) -> Result<usize, TransportError> {
        match self.peers[peer_id].recv_items(buf, n_items)? {
            RecvOutcome::Items(n) => Ok(n),
            RecvOutcome::Closed => Ok(0),
        }
    }

    /// Closes all connections.
    pub fn close(&self) {
        for peer in &self.peers {
            peer.shutdown();
        }
    }
}
