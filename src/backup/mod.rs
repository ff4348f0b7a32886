//! Backup Module
//!
//! Active/standby failover between a static group of members,
//! arbitrated by keep-alives and configured priorities.

mod manager;
mod members;
mod scheduler;
mod status;

pub use manager::{BackupManager, StatusChange};
pub use members::MemberSet;
pub use scheduler::{HeartbeatScheduler, TICK_PERIOD};
pub use status::{AtomicStatus, BackupStatus};
