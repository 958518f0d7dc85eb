//! Peer transport: link abstraction, retry policy, health tracking and the
//! transfer channel built on them.

mod channel;
mod health;
mod link;
mod retry;

pub use channel::{Delivery, PeerHandler, TransferChannel};
pub use health::{ConnectionState, HealthTracker};
pub use link::{Link, LinkError, MemoryLink};
pub use retry::RetryConfig;
