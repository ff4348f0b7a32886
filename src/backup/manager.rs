//! Backup Manager
//!
//! Active/standby arbitration between the members of a failover group.
//!
//! Every node starts UNINIT and sends keep-alives to all members once per
//! tick. A node that hears nothing for the keep-alive timeout promotes
//! itself to ACTIVE. A node that hears from an active or higher-priority
//! member while UNINIT becomes STANDBY, and an ACTIVE node concedes only
//! to an active member with a strictly higher priority. A STANDBY node
//! stays silent; when its active peer goes quiet it drops back to UNINIT
//! and must sit out one more timeout window before promoting.
//!
//! Status and the last keep-alive timestamp live in independent atomics.
//! The tick task and the inbound handler may interleave; every transition
//! is a compare-and-swap from the status it was decided on, so each one is
//! applied and reported at most once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::members::MemberSet;
use super::scheduler::HeartbeatScheduler;
use super::status::{AtomicStatus, BackupStatus};
use crate::config::BackupConfig;
use crate::error::{Error, Result};
use crate::network::{EventHandler, KeepAliveMessage, Message, UdpEvent};

/// Capacity of the status change broadcast
const STATUS_CHANNEL_SIZE: usize = 64;

/// A status transition, reported once per occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: BackupStatus,
    pub to: BackupStatus,
    pub at: DateTime<Utc>,
}

/// Failover state machine for one node
pub struct BackupManager {
    /// Current status
    status: AtomicStatus,
    /// This node's arbitration weight
    priority: i32,
    /// Failover group
    members: MemberSet,
    /// Silence tolerated before escalating
    keepalive_timeout: Duration,
    /// Milliseconds since `origin` of the last accepted keep-alive
    last_keepalive_ms: AtomicU64,
    /// Monotonic clock origin
    origin: Instant,
    /// Outbound keep-alive queue
    outbound_tx: mpsc::Sender<UdpEvent>,
    /// Status change observers
    changes_tx: broadcast::Sender<StatusChange>,
}

impl BackupManager {
    /// Create a new backup manager
    pub fn new(config: &BackupConfig, outbound_tx: mpsc::Sender<UdpEvent>) -> Self {
        let (changes_tx, _) = broadcast::channel(STATUS_CHANNEL_SIZE);

        Self {
            status: AtomicStatus::new(BackupStatus::Uninit),
            priority: config.priority,
            members: MemberSet::new(config.members.iter().cloned(), config.port),
            keepalive_timeout: config.keepalive_timeout(),
            last_keepalive_ms: AtomicU64::new(0),
            origin: Instant::now(),
            outbound_tx,
            changes_tx,
        }
    }

    /// Reset to UNINIT and re-arm the keep-alive timeout
    pub fn init(&self) {
        tracing::info!("Backup members: size={}, {}", self.members.len(), self.members);

        let previous = self.status.swap(BackupStatus::Uninit);
        self.last_keepalive_ms.store(self.now_ms(), Ordering::Release);

        tracing::info!(
            "Backup status initialized to {} (was {}), priority {}, timeout {} ms",
            BackupStatus::Uninit,
            previous,
            self.priority,
            self.keepalive_timeout.as_millis()
        );
    }

    /// Initialize and start the heartbeat scheduler
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.init();
        HeartbeatScheduler::spawn(Arc::clone(self))
    }

    /// Get current status
    pub fn status(&self) -> BackupStatus {
        self.status.load()
    }

    /// Check if this node is the master
    pub fn is_active(&self) -> bool {
        self.status() == BackupStatus::Active
    }

    /// Get this node's priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Get the failover group
    pub fn members(&self) -> &MemberSet {
        &self.members
    }

    /// Get the keep-alive timeout
    pub fn keepalive_timeout(&self) -> Duration {
        self.keepalive_timeout
    }

    /// Timestamp (ms on the manager's clock) of the last accepted keep-alive
    pub fn last_keepalive_ms(&self) -> u64 {
        self.last_keepalive_ms.load(Ordering::Acquire)
    }

    /// Time since the last accepted keep-alive
    pub fn since_last_keepalive(&self) -> Duration {
        Duration::from_millis(self.now_ms().saturating_sub(self.last_keepalive_ms()))
    }

    /// Observe status transitions
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes_tx.subscribe()
    }

    /// Milliseconds elapsed on the manager's monotonic clock
    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Run one tick: timeout evaluation, then keep-alive emission
    pub fn tick(&self) -> Result<usize> {
        self.tick_at(self.now_ms())
    }

    /// Run one tick at an explicit clock reading
    pub fn tick_at(&self, now_ms: u64) -> Result<usize> {
        self.check_timeout_at(now_ms);
        self.emit_keepalives()
    }

    /// Escalate if no keep-alive arrived within the timeout
    /// An ACTIVE node never demotes itself on silence
    pub fn check_timeout_at(&self, now_ms: u64) {
        let status = self.status();
        if status == BackupStatus::Active {
            return;
        }

        let silence = now_ms.saturating_sub(self.last_keepalive_ms());
        if silence <= self.keepalive_timeout.as_millis() as u64 {
            return;
        }

        match status {
            BackupStatus::Standby => {
                if self.transition(BackupStatus::Standby, BackupStatus::Uninit) {
                    self.refresh_keepalive(now_ms);
                }
            }
            BackupStatus::Uninit => {
                self.transition(BackupStatus::Uninit, BackupStatus::Active);
            }
            BackupStatus::Active => {}
        }
    }

    /// Queue one keep-alive per member unless STANDBY
    /// Returns the number of keep-alives queued
    pub fn emit_keepalives(&self) -> Result<usize> {
        let status = self.status();
        if status == BackupStatus::Standby {
            return Ok(0);
        }

        let message = Message::KeepAlive(KeepAliveMessage::new(
            status == BackupStatus::Active,
            self.priority,
        ));

        let mut queued = 0;
        let mut closed = false;
        for address in self.members.addresses() {
            match self.outbound_tx.try_send(UdpEvent::new(message.clone(), address)) {
                Ok(()) => queued += 1,
                Err(mpsc::error::TrySendError::Full(event)) => {
                    tracing::warn!("Outbound queue full, dropping keep-alive to {}", event.address);
                }
                Err(mpsc::error::TrySendError::Closed(event)) => {
                    tracing::debug!("Outbound queue closed, keep-alive to {} not sent", event.address);
                    closed = true;
                }
            }
        }

        if closed {
            return Err(Error::ChannelClosed);
        }

        tracing::trace!("Queued {} keep-alive(s) as {}", queued, status);
        Ok(queued)
    }

    /// Handle an inbound datagram at an explicit clock reading
    pub fn handle_event_at(&self, event: UdpEvent, now_ms: u64) {
        let keepalive = match event.message {
            Message::KeepAlive(keepalive) => keepalive,
            ref other => {
                tracing::warn!(
                    "Receive not keep alive message from {}, type {}",
                    event.host(),
                    other.message_type()
                );
                return;
            }
        };

        let host = event.host();
        if !self.members.contains(host) {
            tracing::warn!("Receive keep alive message from {} is not my member", host);
            return;
        }

        self.refresh_keepalive(now_ms);

        match self.status() {
            BackupStatus::Active => {
                if keepalive.flag && keepalive.priority > self.priority {
                    self.transition(BackupStatus::Active, BackupStatus::Standby);
                }
            }
            BackupStatus::Uninit => {
                if keepalive.flag || keepalive.priority > self.priority {
                    self.transition(BackupStatus::Uninit, BackupStatus::Standby);
                }
            }
            BackupStatus::Standby => {}
        }
    }

    fn refresh_keepalive(&self, now_ms: u64) {
        self.last_keepalive_ms.fetch_max(now_ms, Ordering::AcqRel);
    }

    /// Apply a transition if the status is still `from`
    fn transition(&self, from: BackupStatus, to: BackupStatus) -> bool {
        if !self.status.transition(from, to) {
            tracing::debug!("Skipped transition {} -> {}: status changed concurrently", from, to);
            return false;
        }

        tracing::info!("Change backup status {} -> {}", from, to);

        // No subscribers is fine
        let _ = self.changes_tx.send(StatusChange {
            from,
            to,
            at: Utc::now(),
        });
        true
    }
}

impl EventHandler for BackupManager {
    fn handle_event(&self, event: UdpEvent) {
        self.handle_event_at(event, self.now_ms());
    }
}
