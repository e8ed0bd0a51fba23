use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::events::types::PipelineEvent;

/// Synchronous event listener, invoked inside `EventBus::publish`
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &PipelineEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn handle(&self, event: &PipelineEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Process-wide publish/subscribe channel.
///
/// Registered handlers run synchronously, in registration order, before
/// `publish` returns; async observers read the same events from `receiver()`.
/// Handlers must not rely on the firing order of other handlers.
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn EventHandler>)>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push((id, handler));
        debug!(subscription = id.0, total = handlers.len(), "Registered event handler");
        id
    }

    /// Returns false when the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        before != handlers.len()
    }

    /// Channel view of the bus for async consumers. Only events published after
    /// this call are delivered.
    pub fn receiver(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        // Snapshot so a handler may publish or subscribe without deadlocking
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        trace!(event = event.name(), handlers = handlers.len(), "Publishing event");
        for handler in &handlers {
            handler.handle(&event);
        }

        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::GitOperation;
    use std::sync::Mutex;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(Arc::new(move |event: &PipelineEvent| {
                seen.lock().unwrap().push((tag, event.name()));
            }));
        }

        bus.publish(PipelineEvent::WorkspaceRefreshRequested);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("first", "refresh-workspace-info"),
                ("second", "refresh-workspace-info")
            ]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = bus.subscribe(Arc::new(move |_: &PipelineEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(PipelineEvent::WorkspaceRefreshRequested);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(PipelineEvent::WorkspaceRefreshRequested);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_handler_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::default());
        let inner_bus = Arc::clone(&bus);
        let refreshes = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&refreshes);

        bus.subscribe(Arc::new(move |event: &PipelineEvent| match event {
            PipelineEvent::HandoffCompleted { .. } => {
                inner_bus.publish(PipelineEvent::WorkspaceRefreshRequested)
            }
            PipelineEvent::WorkspaceRefreshRequested => {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }));

        bus.publish(PipelineEvent::HandoffCompleted {
            operation: GitOperation::Push,
        });
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_receiver_sees_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.receiver();

        bus.publish(PipelineEvent::HandoffRequested {
            operation: GitOperation::Pull,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            PipelineEvent::HandoffRequested {
                operation: GitOperation::Pull
            }
        );
    }
}
