pub mod tcp;

pub use tcp::{FramedTransport, TransportError};
