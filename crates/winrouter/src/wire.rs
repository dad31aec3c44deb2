//! Wire protocol between root and child (§6).
//!
//! All multi-byte integers are little-endian. Every message starts with a
//! 12-byte header `(kind, index, size)`; `DATA`/`DATA_RETURN` bodies carry
//! `size` items of `item_size` bytes, and `DATA_RETURN` additionally
//! carries a trailing 4-byte weight footer.

use winrouter_transport::{FramedTransport, TransportError};

use crate::record::{WindowKind, WindowRecord};

const KIND_DATA: u32 = 1;
const KIND_DATA_RETURN: u32 = 2;
const KIND_KILL: u32 = 3;
const KIND_KILL_ACK: u32 = 4;

const HEADER_LEN: usize = 12;
const WEIGHT_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Header {
    kind: u32,
    index: u32,
    size: u32,
}

impl Header {
    fn encode(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.kind.to_le_bytes());
        buf[4..8].copy_from_slice(&self.index.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    fn decode(buf: [u8; HEADER_LEN]) -> Self {
        Self {
            kind: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            index: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        }
    }
}

/// Writes one record as a framed wire message. `return_weight` is the
/// discriminator between directions: `None` sends the downward
/// `DATA`/`KILL` tags (root → child), `Some(weight)` sends the upward
/// `DATA_RETURN`/`KILL_ACK` tags with that weight as the footer
/// (child → root).
pub fn send_record(
    transport: &FramedTransport,
    peer_id: usize,
    record: &WindowRecord,
    item_size: usize,
    return_weight: Option<u32>,
) -> Result<(), TransportError> {
    match record.kind {
        WindowKind::Kill => {
            let kind = if return_weight.is_some() { KIND_KILL_ACK } else { KIND_KILL };
            transport.send(peer_id, &Header { kind, index: 0, size: 0 }.encode())?;
        }
        WindowKind::Data => {
            let size = (record.payload.len() / item_size) as u32;
            let kind = if return_weight.is_some() { KIND_DATA_RETURN } else { KIND_DATA };
            transport.send(peer_id, &Header { kind, index: record.index, size }.encode())?;
            transport.send(peer_id, &record.payload)?;
            if let Some(weight) = return_weight {
                transport.send(peer_id, &weight.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

/// A decoded incoming wire message.
pub enum Incoming {
    Data { record: WindowRecord },
    Kill,
    KillAck,
    /// A `kind` neither side defines (§4.5 "2 is reserved/not supported;
    /// log and ignore").
    Unsupported(u32),
    /// The peer closed its end in an orderly fashion.
    Closed,
}

/// Reads one framed message from `peer_id`.
pub fn recv_record(
    transport: &FramedTransport,
    peer_id: usize,
    item_size: usize,
) -> Result<Incoming, TransportError> {
    let mut header_buf = [0u8; HEADER_LEN];
    if !transport.recv_exact(peer_id, &mut header_buf)? {
        return Ok(Incoming::Closed);
    }
    let header = Header::decode(header_buf);

    match header.kind {
        KIND_KILL => Ok(Incoming::Kill),
        KIND_KILL_ACK => Ok(Incoming::KillAck),
        KIND_DATA | KIND_DATA_RETURN => {
            let n_items = header.size as usize;
            let mut payload = vec![0u8; n_items * item_size];

            let mut filled = 0;
            while filled < n_items {
                let got = transport.recv_items(peer_id, &mut payload[filled * item_size..], n_items - filled)?;
                if got == 0 {
                    return Err(TransportError::PeerClosed);
                }
                filled += got;
            }

            let mut record = WindowRecord::data(header.index, payload);
            if header.kind == KIND_DATA_RETURN {
                let mut weight_buf = [0u8; WEIGHT_LEN];
                if !transport.recv_exact(peer_id, &mut weight_buf)? {
                    return Err(TransportError::PeerClosed);
                }
                record.weight = Some(u32::from_le_bytes(weight_buf));
            }
            Ok(Incoming::Data { record })
        }
        other => Ok(Incoming::Unsupported(other)),
    }
}
