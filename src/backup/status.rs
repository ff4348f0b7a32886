//! Backup Status

use std::sync::atomic::{AtomicU8, Ordering};
use serde::{Deserialize, Serialize};

/// Failover status of this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    /// Not yet committed to a role
    Uninit,
    /// Another member is active
    Standby,
    /// This node is the master
    Active,
}

impl BackupStatus {
    fn as_u8(self) -> u8 {
        match self {
            BackupStatus::Uninit => 0,
            BackupStatus::Standby => 1,
            BackupStatus::Active => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => BackupStatus::Uninit,
            1 => BackupStatus::Standby,
            2 => BackupStatus::Active,
            other => unreachable!("corrupted backup status value {}", other),
        }
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::Uninit => write!(f, "UNINIT"),
            BackupStatus::Standby => write!(f, "STANDBY"),
            BackupStatus::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Lock-free status cell
#[derive(Debug)]
pub struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub fn new(status: BackupStatus) -> Self {
        Self(AtomicU8::new(status.as_u8()))
    }

    pub fn load(&self) -> BackupStatus {
        BackupStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store unconditionally, returning the previous status
    pub fn swap(&self, status: BackupStatus) -> BackupStatus {
        BackupStatus::from_u8(self.0.swap(status.as_u8(), Ordering::AcqRel))
    }

    /// Move from `from` to `to`; returns false if the status was not `from`
    pub fn transition(&self, from: BackupStatus, to: BackupStatus) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
