mod error;
mod queue;

pub use error::QueueError;
pub use queue::WindowQueue;
