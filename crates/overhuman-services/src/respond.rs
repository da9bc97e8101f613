//! Correlation-id keyed response delivery.
//!
//! Sync HTTP callers park on a oneshot receiver registered here; after
//! the pipeline's final stage the daemon looks the correlation id up and
//! delivers the run outcome. Timed-out registrations are removed by the
//! caller.

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

/// What a waiting caller receives: the result text on success, the
/// failure reason otherwise.
pub type RunOutcome = std::result::Result<String, String>;

/// Registry of waiting sync callers.
#[derive(Default)]
pub struct ResponseRegistry {
    waiting: DashMap<String, oneshot::Sender<RunOutcome>>,
}

impl ResponseRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. A second registration under the same id
    /// replaces the first (whose receiver then resolves as closed).
    pub fn register(&self, correlation_id: impl Into<String>) -> oneshot::Receiver<RunOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(correlation_id.into(), tx);
        rx
    }

    /// Deliver an outcome to a waiter. Returns false when nobody waits
    /// under that id (fire-and-forget inputs, timed-out callers).
    pub fn deliver(&self, correlation_id: &str, outcome: RunOutcome) -> bool {
        match self.waiting.remove(correlation_id) {
            Some((_, tx)) => {
                let delivered = tx.send(outcome).is_ok();
                debug!(correlation_id, delivered, "sync response delivered");
                delivered
            }
            None => false,
        }
    }

    /// Drop a registration (sync timeout cleanup).
    pub fn remove(&self, correlation_id: &str) {
        self.waiting.remove(correlation_id);
    }

    /// Number of callers currently waiting.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    /// True when nobody waits.
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_resolves_waiter() {
        let registry = ResponseRegistry::new();
        let rx = registry.register("c1");
        assert!(registry.deliver("c1", Ok("done".into())));
        assert_eq!(rx.await.unwrap(), Ok("done".to_string()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failure_outcome_carries_reason() {
        let registry = ResponseRegistry::new();
        let rx = registry.register("c1");
        registry.deliver("c1", Err("cancelled".into()));
        assert_eq!(rx.await.unwrap(), Err("cancelled".to_string()));
    }

    #[test]
    fn deliver_without_waiter_is_false() {
        let registry = ResponseRegistry::new();
        assert!(!registry.deliver("ghost", Ok("lost".into())));
    }

    #[tokio::test]
    async fn remove_cleans_up() {
        let registry = ResponseRegistry::new();
        let _rx = registry.register("c1");
        assert_eq!(registry.len(), 1);
        registry.remove("c1");
        assert!(registry.is_empty());
        assert!(!registry.deliver("c1", Ok("too late".into())));
    }

    #[tokio::test]
    async fn reregistration_replaces_waiter() {
        let registry = ResponseRegistry::new();
        let first = registry.register("c1");
        let second = registry.register("c1");
        assert_eq!(registry.len(), 1);
        registry.deliver("c1", Ok("for the second".into()));
        assert!(first.await.is_err());
        assert_eq!(second.await.unwrap(), Ok("for the second".to_string()));
    }
}
