use flume::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::types::{TraceEntry, TraceStatus};

/// Decision trace queue.
///
/// Every entry is emitted as a `tracing` event immediately and also queued
/// for a consumer (audit sink, test) that drains it. Recording never
/// blocks: when the queue is full the oldest queued entry is evicted, so
/// the queue always holds the most recent turns.
#[derive(Clone)]
pub struct DecisionTracer {
    sender: Sender<TraceEntry>,
    receiver: Receiver<TraceEntry>,
}

impl DecisionTracer {
    pub fn new(queue_capacity: usize) -> Self {
        let (sender, receiver) = bounded(queue_capacity.max(1));
        debug!("Initializing DecisionTracer: queue={}", queue_capacity);
        Self { sender, receiver }
    }

    pub fn record(&self, entry: TraceEntry) {
        match entry.status {
            TraceStatus::Anomaly => warn!(
                session = %entry.session_key,
                stage = entry.stage.as_str(),
                rule = %entry.rule,
                reason = %entry.reason,
                "decision anomaly"
            ),
            TraceStatus::Fired | TraceStatus::Fallback => info!(
                session = %entry.session_key,
                stage = entry.stage.as_str(),
                status = entry.status.as_str(),
                rule = %entry.rule,
                reason = %entry.reason,
                "decision rule"
            ),
            TraceStatus::Info => debug!(
                session = %entry.session_key,
                stage = entry.stage.as_str(),
                rule = %entry.rule,
                reason = %entry.reason,
                "decision trace"
            ),
        }

        // Without a consumer the queue is a ring: the oldest entry makes room.
        if let Err(TrySendError::Full(entry)) = self.sender.try_send(entry) {
            if let Ok(evicted) = self.receiver.try_recv() {
                debug!(rule = %evicted.rule, "trace queue full, evicted oldest entry");
            }
            if let Err(e) = self.sender.try_send(entry) {
                warn!("Failed to enqueue trace entry: {}", e);
            }
        }
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<TraceEntry> {
        self.receiver.try_iter().collect()
    }

    /// Receiver for a long-lived consumer.
    pub fn subscribe(&self) -> Receiver<TraceEntry> {
        self.receiver.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_queue_full(&self) -> bool {
        self.sender.is_full()
    }
}

impl Default for DecisionTracer {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::types::TraceStage;

    #[test]
    fn test_record_and_drain() {
        let tracer = DecisionTracer::new(8);
        tracer.record(
            TraceEntry::builder("s1", TraceStage::Classifier, "time_only_followup")
                .reason("bare month")
                .field("month", "August")
                .build(),
        );
        assert_eq!(tracer.queue_len(), 1);

        let entries = tracer.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rule, "time_only_followup");
        assert_eq!(entries[0].fields["month"], "August");
        assert_eq!(tracer.queue_len(), 0);
    }

    #[test]
    fn test_full_queue_keeps_newest() {
        let tracer = DecisionTracer::new(1);
        for i in 0..3 {
            tracer.record(
                TraceEntry::builder("s1", TraceStage::Router, &format!("r{}", i))
                    .status(TraceStatus::Info)
                    .build(),
            );
        }
        assert!(tracer.is_queue_full());
        let entries = tracer.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rule, "r2");
    }

    #[test]
    fn test_sustained_load_without_consumer() {
        let tracer = DecisionTracer::new(8);
        for i in 0..600 {
            tracer.record(TraceEntry::builder("s1", TraceStage::Classifier, &format!("turn{}", i)).build());
        }
        let rules: Vec<_> = tracer.drain().into_iter().map(|e| e.rule).collect();
        let expected: Vec<_> = (592..600).map(|i| format!("turn{}", i)).collect();
        assert_eq!(rules, expected);
    }

    #[test]
    fn test_subscriber_sees_entries() {
        let tracer = DecisionTracer::new(4);
        let rx = tracer.subscribe();
        tracer.record(TraceEntry::builder("s1", TraceStage::Store, "missing").build());
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.stage, TraceStage::Store);
        assert!(tracer.drain().is_empty());
    }
}
