//! Network Module
//!
//! UDP transport and wire protocol for keep-alive traffic between members.

pub mod protocol;
mod transport;

pub use protocol::{KeepAliveMessage, Message, MessageType};
pub use transport::{EventHandler, UdpEvent, UdpTransport, OUTBOUND_QUEUE_SIZE};
