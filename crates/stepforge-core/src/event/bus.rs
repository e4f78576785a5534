//! Broadcast bus for `StepEvent`.
//!
//! Built on `tokio::sync::broadcast`. Publishing with no subscribers is a
//! no-op, so execution never depends on anyone listening.

use std::sync::{Arc, Mutex};

use stepforge_types::event::StepEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for step and run lifecycle events.
///
/// Cloning the bus clones the sender; all clones feed the same subscribers.
pub struct EventBus {
    sender: broadcast::Sender<StepEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StepEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StepEvent) {
        tracing::trace!(event = event.name(), step_id = ?event.step_id(), "publishing event");
        let _ = self.sender.send(event);
    }

    pub fn sender(&self) -> &broadcast::Sender<StepEvent> {
        &self.sender
    }

    /// Spawn a task that appends every event to an ordered, shared log.
    ///
    /// Must be called from within a Tokio runtime. The task ends when every
    /// clone of the bus has been dropped.
    pub fn record(&self) -> EventLog {
        let log = EventLog::default();
        let mut rx = self.subscribe();
        let sink = log.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => sink.push(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event log lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        log
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// Ordered in-memory copy of events, filled by [`EventBus::record`].
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<StepEvent>>>,
}

impl EventLog {
    fn push(&self, event: StepEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event names in publication order, e.g. `["step_started", "step_completed"]`.
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|e| e.iter().map(StepEvent::name).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn started() -> StepEvent {
        StepEvent::RunStarted {
            run_id: Uuid::now_v7(),
            workflow_name: "login".to_string(),
            total_steps: 3,
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(started());

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, StepEvent::RunStarted { total_steps: 3, .. }));
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(started());

        assert_eq!(rx1.recv().await.unwrap().name(), "run_started");
        assert_eq!(rx2.recv().await.unwrap().name(), "run_started");
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(16);
        bus.publish(started());
        bus.publish(started());
    }

    #[tokio::test]
    async fn lagging_receiver_reports_lag() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        let run_id = Uuid::now_v7();
        for i in 0..10 {
            bus.publish(StepEvent::StepCancelled {
                run_id,
                step_id: format!("s{i}"),
                timestamp: chrono::Utc::now(),
            });
        }

        match rx.try_recv() {
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn record_keeps_publication_order() {
        let bus = EventBus::new(16);
        let log = bus.record();
        let run_id = Uuid::now_v7();

        bus.publish(started());
        bus.publish(StepEvent::RunCompleted {
            run_id,
            duration_ms: 5,
        });

        for _ in 0..50 {
            if log.len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(log.names(), vec!["run_started", "run_completed"]);
    }

    #[test]
    fn clone_shares_channel() {
        let bus = EventBus::new(16);
        let bus2 = bus.clone();
        let mut rx = bus.subscribe();

        bus2.publish(started());

        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn debug_shows_receiver_count() {
        let bus = EventBus::new(16);
        let _rx = bus.subscribe();
        let debug = format!("{bus:?}");
        assert!(debug.contains("EventBus"));
        assert!(debug.contains("receiver_count: 1"));
    }
}
