pub mod child;
pub mod config;
pub mod record;
pub mod root;
pub mod sink;
pub mod source;
mod throughput;
mod weight;
mod wire;

pub use child::ChildRouter;
pub use config::{ConfigError, RouterConfig};
pub use record::{WindowKind, WindowRecord};
pub use root::RootRouter;
pub use sink::{IndexTag, QueueSink};
pub use source::{Emission, PollOutcome, QueueSource};

pub use winrouter_queue::{QueueError, WindowQueue};
pub use winrouter_transport::{FramedTransport, TransportError};
