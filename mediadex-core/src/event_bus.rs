use tokio::sync::broadcast;
use tracing::trace;

use crate::events::ScanEvent;

/// In-process fan-out of scan events to any number of observers.
///
/// Slow subscribers lag and lose the oldest events; producers never block.
#[derive(Clone)]
pub struct InProcScanEventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl InProcScanEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ScanEvent) {
        trace!(target: "scan::events", kind = event.kind(), "publish");
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for InProcScanEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcScanEventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_to_every_subscriber() {
        let bus = InProcScanEventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(ScanEvent::QueueSizeUpdate { queue_size: 1 });

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                ScanEvent::QueueSizeUpdate { queue_size } => {
                    assert_eq!(queue_size, 1)
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = InProcScanEventBus::new(1);
        bus.publish(ScanEvent::WorkerError {
            error: "nobody listens".into(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
