/// The kind of a window record (§3 "Window record").
///
/// `DATA_RETURN`/`KILL_ACK` (§6) are wire-only framing distinctions: once a
/// record is off the wire and sitting in a queue, "returned from a child"
/// and "dispatched to a child" are both just `Data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Data,
    Kill,
}

/// A variable-length unit of routable work (§3).
#[derive(Debug, Clone)]
pub struct WindowRecord {
    pub kind: WindowKind,
    pub index: u32,
    pub payload: Vec<u8>,
    /// Set only on a record a child is in the middle of returning upward:
    /// the child's in-flight count at the moment of return, carried as the
    /// DATA_RETURN wire footer (§6).
    pub weight: Option<u32>,
}

impl WindowRecord {
    pub fn data(index: u32, payload: Vec<u8>) -> Self {
        Self { kind: WindowKind::Data, index, payload, weight: None }
    }

    pub fn kill() -> Self {
        Self { kind: WindowKind::Kill, index: 0, payload: Vec::new(), weight: None }
    }

    pub fn is_kill(&self) -> bool {
        matches!(self.kind, WindowKind::Kill)
    }

    /// Item count, given the configured item size in bytes.
    pub fn size(&self, item_size: usize) -> usize {
        self.payload.len() / item_size
    }
}
