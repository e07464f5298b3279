//! The Query Backend adapter (L7) and Message Processor (L8).

pub mod fake;
mod message;
pub mod processor;
mod query;
pub mod stub;

pub use message::Message;
pub use query::{QueryBackend, QueryRequest};
pub use stub::StubQueryBackend;
