//! Heartbeat service.
//!
//! Synthesizes a heartbeat input on a fixed interval (default 30
//! minutes) and pushes it into the daemon queue. When the queue is full
//! the heartbeat is dropped, not buffered; the next tick tries again.
//! Exits when the cancellation token fires.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use overhuman_types::input::NormalizedInput;

use crate::error::{Result, ServiceError};

/// Default cadence in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 30;

/// A service that injects heartbeat inputs at a regular interval.
pub struct HeartbeatService {
    interval: Duration,
    queue: mpsc::Sender<NormalizedInput>,
}

impl HeartbeatService {
    /// Create a heartbeat service ticking every `interval_minutes`.
    pub fn new(interval_minutes: u64, queue: mpsc::Sender<NormalizedInput>) -> Self {
        Self {
            interval: Duration::from_secs(interval_minutes.max(1) * 60),
            queue,
        }
    }

    /// A service with a raw interval, for tests.
    pub fn with_interval(interval: Duration, queue: mpsc::Sender<NormalizedInput>) -> Self {
        Self { interval, queue }
    }

    /// Run the tick loop.
    ///
    /// Returns cleanly on cancellation; returns
    /// [`ServiceError::QueueClosed`] when the daemon queue is gone.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            "heartbeat service started"
        );
        let mut ticker = tokio::time::interval(self.interval);

        // The first tick fires immediately; skip it so the first heartbeat
        // happens after one full interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("heartbeat service shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.queue.try_send(NormalizedInput::heartbeat()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            // Dropped by contract: a stale heartbeat is
                            // worthless once the queue drains.
                            warn!("queue full; heartbeat dropped");
                        }
                        Err(TrySendError::Closed(_)) => {
                            return Err(ServiceError::QueueClosed);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overhuman_types::input::{InputSource, Priority};

    #[tokio::test(start_paused = true)]
    async fn emits_heartbeats_on_the_interval() {
        let (tx, mut rx) = mpsc::channel(8);
        let svc = HeartbeatService::with_interval(Duration::from_secs(60), tx);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { svc.start(run_cancel).await });

        // Paused clock: advance past two intervals.
        tokio::time::sleep(Duration::from_secs(121)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let first = rx.try_recv().unwrap();
        assert!(first.is_heartbeat());
        assert_eq!(first.source, InputSource::Timer);
        assert_eq!(first.meta.channel, "heartbeat");
        assert_eq!(first.payload, "heartbeat");
        assert_eq!(first.priority, Priority::Critical);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_heartbeat_and_continues() {
        let (tx, mut rx) = mpsc::channel(1);
        // Fill the queue so the first tick has nowhere to go.
        tx.try_send(NormalizedInput::text("occupying", "test")).unwrap();

        let svc = HeartbeatService::with_interval(Duration::from_secs(60), tx);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { svc.start(run_cancel).await });

        tokio::time::sleep(Duration::from_secs(61)).await;
        // Drain; the dropped heartbeat never arrives.
        assert_eq!(rx.try_recv().unwrap().payload, "occupying");
        assert!(rx.try_recv().is_err());

        // The loop survives the drop and delivers on the next tick.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().unwrap().is_heartbeat());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn graceful_shutdown_on_cancel() {
        let (tx, _rx) = mpsc::channel(8);
        let svc = HeartbeatService::new(60, tx);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { svc.start(run_cancel).await });

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_queue_returns_error() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let svc = HeartbeatService::with_interval(Duration::from_secs(60), tx);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(async move { svc.start(cancel).await });

        tokio::time::sleep(Duration::from_secs(61)).await;
        let result = handle.await.unwrap();
        assert!(matches!(result.unwrap_err(), ServiceError::QueueClosed));
    }

    #[test]
    fn default_interval_is_minutes() {
        let (tx, _rx) = mpsc::channel(1);
        let svc = HeartbeatService::new(30, tx);
        assert_eq!(svc.interval, Duration::from_secs(1800));
    }
}
