//! Public façade for the coordination layer: the server context that owns
//! every primitive, and the per-message pipeline the transport calls into.

pub mod classify;
pub mod context;
pub mod message;
pub mod pipeline;
pub mod transport;

pub use classify::PriorityClassifier;
pub use context::{ServerContext, ServerContextBuilder, SystemStats};
pub use message::ChatMessage;
pub use pipeline::{Admission, Coordinator, SHUTTING_DOWN, TEMPORARILY_UNAVAILABLE};
pub use transport::{ChannelSink, ConnectionId, InMemoryStore, MessageSink, MessageStore, SinkError};
