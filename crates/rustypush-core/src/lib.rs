// ── RustyPush Core Library ───────────────────────────────────────────────────
//
// This crate contains everything behind the `rustypush` binary: wire
// framing for stdio and Unix sockets, the JSON-RPC style dispatch loop,
// the two notification tools, and the concurrent channel broadcaster.

pub mod args;
pub mod broadcast;
pub mod channels;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod tools;
pub mod transport;

// Re-export the types most callers need at crate root for convenience
pub use broadcast::{Broadcaster, DeliveryStatus, DispatchResult, SendOptions};
pub use channels::{ChannelSender, ChannelSet};
pub use config::Config;
pub use error::PushError;
pub use protocol::NotifyServer;
pub use tools::{ToolCallResult, ToolRegistry};
