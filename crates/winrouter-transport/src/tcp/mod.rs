mod connector;
mod stream;

pub use connector::FramedTransport;
pub use stream::TransportError;
