//! Incremental update notifications for the presentation layer.

use crossbeam_channel::{unbounded, Receiver, Sender};

use stackscope_analysis::{AggregateKind, ZoneEvent, ZoneId};

/// An incremental state change worth redrawing for.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A new dataset replaced the previous one.
    DatasetReplaced { frame_count: usize },
    /// Series entries became available.
    SeriesUpdated {
        zone: ZoneId,
        kind: AggregateKind,
        frames: Vec<usize>,
    },
    /// Series entries failed to compute.
    SeriesFailed {
        zone: ZoneId,
        kind: AggregateKind,
        frames: Vec<usize>,
    },
    /// A zone was created, edited, or removed.
    ZoneChanged(ZoneEvent),
}

/// Fan-out of [`SessionUpdate`]s to any number of subscribers.
#[derive(Default)]
pub struct SubscriberSet {
    senders: Vec<Sender<SessionUpdate>>,
}

impl SubscriberSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> Receiver<SessionUpdate> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    /// Deliver an update to every live subscriber, dropping dead ones.
    pub fn broadcast(&mut self, update: &SessionUpdate) {
        self.senders.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// True when nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let mut set = SubscriberSet::new();
        let a = set.subscribe();
        let b = set.subscribe();

        set.broadcast(&SessionUpdate::DatasetReplaced { frame_count: 3 });

        assert_eq!(
            a.try_recv().unwrap(),
            SessionUpdate::DatasetReplaced { frame_count: 3 }
        );
        assert_eq!(
            b.try_recv().unwrap(),
            SessionUpdate::DatasetReplaced { frame_count: 3 }
        );
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let mut set = SubscriberSet::new();
        let keep = set.subscribe();
        {
            let _dropped = set.subscribe();
        }
        set.broadcast(&SessionUpdate::DatasetReplaced { frame_count: 1 });
        assert_eq!(set.len(), 1);
        assert!(keep.try_recv().is_ok());
    }
}
