//! Heartbeat Scheduler
//!
//! Drives `BackupManager::tick` once per second for the life of the
//! process. A failed or panicking tick is logged and the next tick runs
//! as usual.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::manager::BackupManager;

/// Tick period, also the delay before the first tick
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Periodic keep-alive task
pub struct HeartbeatScheduler;

impl HeartbeatScheduler {
    /// Spawn the tick loop
    pub fn spawn(manager: Arc<BackupManager>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            // Fixed delay: a late tick pushes the schedule back instead of bursting
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!("Keep-alive loop started ({} ms period)", TICK_PERIOD.as_millis());

            loop {
                interval.tick().await;
                run_tick(&manager);
            }
        })
    }
}

fn run_tick(manager: &BackupManager) {
    match catch_unwind(AssertUnwindSafe(|| manager.tick())) {
        Ok(Ok(queued)) => {
            tracing::trace!("Keep-alive tick complete, {} queued", queued);
        }
        Ok(Err(e)) => {
            tracing::error!("Exception in send keep alive message: {}", e);
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Keep-alive tick panicked: {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupStatus;
    use crate::config::BackupConfig;
    use crate::network::{KeepAliveMessage, Message, UdpEvent};
    use tokio::sync::mpsc;

    fn config() -> BackupConfig {
        BackupConfig {
            members: vec!["10.0.0.2".to_string()],
            port: 10001,
            priority: 4,
            keepalive_timeout_ms: 3000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let (tx, mut rx) = mpsc::channel::<UdpEvent>(64);
        let manager = Arc::new(BackupManager::new(&config(), tx));
        let _handle = manager.start();

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let event = rx.try_recv().unwrap();
        assert_eq!(event.address, "10.0.0.2:10001");
        assert_eq!(event.message, Message::KeepAlive(KeepAliveMessage::new(false, 4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_group_promotes_to_active() {
        let (tx, mut rx) = mpsc::channel::<UdpEvent>(64);
        let manager = Arc::new(BackupManager::new(&config(), tx));
        let _handle = manager.start();

        // Ticks at 1s, 2s, 3s stay UNINIT; the 4s tick is past the 3000 ms timeout
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(manager.status(), BackupStatus::Uninit);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(manager.status(), BackupStatus::Active);

        let mut flags = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Message::KeepAlive(keepalive) = event.message {
                flags.push(keepalive.flag);
            }
        }
        assert_eq!(flags, vec![false, false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ticks_do_not_stop_the_loop() {
        let (tx, rx) = mpsc::channel::<UdpEvent>(64);
        drop(rx);
        let manager = Arc::new(BackupManager::new(&config(), tx));
        let handle = manager.start();

        // Every tick fails to queue, the state machine keeps advancing
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(manager.status(), BackupStatus::Active);
        assert!(!handle.is_finished());

        handle.abort();
    }
}
