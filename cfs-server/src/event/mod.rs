pub mod bus;
pub mod error;
pub mod transport;

pub use bus::EventBus;
pub use error::EventBusError;
pub use transport::{EventEnvelope, EventKind, EventTransport, InMemoryEventTransport, RedisEventTransport};
