//! WolfHA - Active/Standby Failover Arbitration
//!
//! Keeps exactly one node of a small, statically configured group in the
//! ACTIVE role without a central coordinator.
//!
//! # Architecture
//!
//! Every node sends a UDP keep-alive to each member once per second,
//! carrying whether it believes it is active and its configured priority.
//! A node that hears nothing for the keep-alive timeout promotes itself;
//! conflicting claims are settled in favour of the higher priority.
//!
//! This is best-effort arbitration, not consensus: during a partition both
//! sides can be active at the same time.
//!
//! # Features
//!
//! - Three-state failover machine (UNINIT, STANDBY, ACTIVE)
//! - Lock-free status and liveness tracking
//! - Checksummed keep-alive datagrams over a shared UDP transport
//! - HTTP status API

pub mod config;
pub mod error;
pub mod backup;
pub mod network;
pub mod api;

pub use config::WolfHaConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfHaConfig;
    pub use crate::error::{Error, Result};
    pub use crate::backup::{BackupManager, BackupStatus, MemberSet, StatusChange};
    pub use crate::network::{KeepAliveMessage, Message, UdpEvent, UdpTransport};
}
