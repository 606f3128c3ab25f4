//! Per-tick admission control for feature additions.
//!
//! Adding a feature is expensive (geometry, textures), and producers emit
//! features in bursts after large camera moves. The controller admits at
//! most `limit` additions per render tick and parks the rest in a pending
//! queue that is drained at the end of each tick.
//!
//! ```text
//!                 add ──► counter < limit ? ──yes──► deliver, counter += 1
//!                                │
//!                                no
//!                                ▼
//!                         pending queue ──(end_tick)──► deliver, counter += 1
//!
//!              remove ──► queued add for the same feature ? ──yes──► drop both
//!                                │
//!                                no ──► deliver immediately, uncounted
//! ```
//!
//! `end_tick` resets the counter and then drains into the fresh budget, so
//! the drained additions count against the next tick and no tick ever
//! delivers more than `limit` additions. Removals are never throttled: a
//! stale feature lingering on screen is worse than a late new one. A removal
//! that finds its feature still waiting in the pending queue cancels that
//! addition instead, so the layer never sees either event.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::channel::FeatureMessage;
use crate::layer::{LayerError, LayerRegistry};

/// Order in which queued additions leave the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainOrder {
    /// Most recently queued first.
    #[default]
    Lifo,
    /// Oldest first.
    Fifo,
}

impl DrainOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainOrder::Lifo => "lifo",
            DrainOrder::Fifo => "fifo",
        }
    }
}

impl fmt::Display for DrainOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrainOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lifo" => Ok(DrainOrder::Lifo),
            "fifo" => Ok(DrainOrder::Fifo),
            other => Err(format!("expected 'lifo' or 'fifo', got '{}'", other)),
        }
    }
}

/// Receives admitted feature messages.
pub trait FeatureSink {
    fn deliver(&mut self, message: FeatureMessage) -> Result<(), LayerError>;
}

impl FeatureSink for LayerRegistry {
    fn deliver(&mut self, message: FeatureMessage) -> Result<(), LayerError> {
        match message {
            FeatureMessage::Add {
                id,
                feature_id,
                feature,
            } => self.add(&id, &feature_id, feature),
            FeatureMessage::Remove { id, feature_id } => self.remove(&id, &feature_id),
        }
    }
}

/// Whether the current tick still has budget for additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    Admitting,
    Saturated,
}

/// What happened to an offered message.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Delivered to the sink.
    Delivered,
    /// Parked in the pending queue.
    Queued,
    /// Delivery was attempted and the sink rejected it. The message is gone.
    Rejected(LayerError),
    /// A removal that cancelled a queued addition. Neither reached the sink.
    Cancelled,
}

/// Result of an end-of-tick drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Queued additions handed to the sink (including rejected ones).
    pub delivered: usize,
    /// Additions still waiting.
    pub remaining: usize,
}

/// Running totals since the controller was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdmissionStats {
    /// Additions delivered directly on arrival.
    pub admitted: u64,
    /// Additions parked in the pending queue.
    pub queued: u64,
    /// Additions delivered from the pending queue.
    pub drained: u64,
    /// Removals delivered.
    pub removed: u64,
    /// Queued additions cancelled by a removal before delivery.
    pub cancelled: u64,
    /// Deliveries the sink rejected.
    pub rejected: u64,
    /// Largest pending queue length observed.
    pub queue_high_water: usize,
}

/// Rate limiter for `add` deliveries.
#[derive(Debug)]
pub struct AdmissionController {
    limit: usize,
    counter: usize,
    pending: VecDeque<FeatureMessage>,
    order: DrainOrder,
    stats: AdmissionStats,
}

impl AdmissionController {
    /// Create a controller admitting `limit` additions per tick.
    ///
    /// A limit of zero is raised to one.
    pub fn new(limit: usize, order: DrainOrder) -> Self {
        Self {
            limit: limit.max(1),
            counter: 0,
            pending: VecDeque::new(),
            order,
            stats: AdmissionStats::default(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Additions counted against the current tick.
    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn drain_order(&self) -> DrainOrder {
        self.order
    }

    pub fn stats(&self) -> AdmissionStats {
        self.stats
    }

    pub fn state(&self) -> AdmissionState {
        if self.counter < self.limit {
            AdmissionState::Admitting
        } else {
            AdmissionState::Saturated
        }
    }

    /// Admit an inbound message during the tick.
    pub fn offer<S: FeatureSink + ?Sized>(
        &mut self,
        message: FeatureMessage,
        sink: &mut S,
    ) -> Admission {
        if !message.is_add() {
            if self.cancel_pending(&message) {
                return Admission::Cancelled;
            }
            self.stats.removed += 1;
            return self.deliver(message, sink);
        }

        match self.state() {
            AdmissionState::Admitting => {
                self.counter += 1;
                self.stats.admitted += 1;
                self.deliver(message, sink)
            }
            AdmissionState::Saturated => {
                self.pending.push_back(message);
                self.stats.queued += 1;
                self.stats.queue_high_water = self.stats.queue_high_water.max(self.pending.len());
                Admission::Queued
            }
        }
    }

    /// End-of-tick drain: reset the counter, then deliver queued additions
    /// up to the limit.
    pub fn end_tick<S: FeatureSink + ?Sized>(&mut self, sink: &mut S) -> DrainReport {
        self.counter = 0;

        let mut delivered = 0;
        while self.counter < self.limit {
            let next = match self.order {
                DrainOrder::Lifo => self.pending.pop_back(),
                DrainOrder::Fifo => self.pending.pop_front(),
            };
            let Some(message) = next else { break };

            self.counter += 1;
            self.stats.drained += 1;
            self.deliver(message, sink);
            delivered += 1;
        }

        if delivered > 0 {
            tracing::debug!(
                delivered,
                remaining = self.pending.len(),
                "Drained pending feature additions"
            );
        }

        DrainReport {
            delivered,
            remaining: self.pending.len(),
        }
    }

    /// Drop the queued addition `removal` refers to, if there is one.
    fn cancel_pending(&mut self, removal: &FeatureMessage) -> bool {
        let position = self.pending.iter().position(|queued| {
            queued.layer_id() == removal.layer_id() && queued.feature_id() == removal.feature_id()
        });
        let Some(index) = position else {
            return false;
        };

        self.pending.remove(index);
        self.stats.cancelled += 1;
        tracing::debug!(
            layer = %removal.layer_id(),
            feature = %removal.feature_id(),
            "Removal cancelled queued feature addition"
        );
        true
    }

    fn deliver<S: FeatureSink + ?Sized>(
        &mut self,
        message: FeatureMessage,
        sink: &mut S,
    ) -> Admission {
        let layer = message.layer_id().clone();
        let feature_id = message.feature_id().to_string();

        match sink.deliver(message) {
            Ok(()) => Admission::Delivered,
            Err(e) => {
                self.stats.rejected += 1;
                match e {
                    LayerError::UnknownLayer(_) => tracing::warn!(
                        layer = %layer,
                        feature = %feature_id,
                        "Dropping feature event for unknown layer"
                    ),
                    _ => tracing::debug!(
                        layer = %layer,
                        feature = %feature_id,
                        error = %e,
                        "Layer rejected feature event"
                    ),
                }
                Admission::Rejected(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Sink that records delivered feature ids, optionally rejecting a layer.
    #[derive(Default)]
    struct RecordingSink {
        delivered: Vec<FeatureMessage>,
        reject_layer: Option<&'static str>,
    }

    impl RecordingSink {
        fn ids(&self) -> Vec<&str> {
            self.delivered.iter().map(|m| m.feature_id()).collect()
        }
    }

    impl FeatureSink for RecordingSink {
        fn deliver(&mut self, message: FeatureMessage) -> Result<(), LayerError> {
            if Some(message.layer_id().as_str()) == self.reject_layer {
                return Err(LayerError::UnknownLayer(message.layer_id().clone()));
            }
            self.delivered.push(message);
            Ok(())
        }
    }

    fn add(n: usize) -> FeatureMessage {
        FeatureMessage::add("tiles", format!("f{}", n), json!(n))
    }

    #[test]
    fn test_five_adds_limit_two() {
        let mut controller = AdmissionController::new(2, DrainOrder::Lifo);
        let mut sink = RecordingSink::default();

        // Tick 1: five adds arrive
        for n in 0..5 {
            controller.offer(add(n), &mut sink);
        }
        assert_eq!(sink.delivered.len(), 2);
        assert_eq!(controller.pending_len(), 3);
        assert_eq!(controller.state(), AdmissionState::Saturated);

        // Tick 2
        let report = controller.end_tick(&mut sink);
        assert_eq!(report, DrainReport { delivered: 2, remaining: 1 });
        assert_eq!(sink.delivered.len(), 4);

        // Tick 3
        let report = controller.end_tick(&mut sink);
        assert_eq!(report, DrainReport { delivered: 1, remaining: 0 });
        assert_eq!(sink.delivered.len(), 5);

        // Nothing left
        let report = controller.end_tick(&mut sink);
        assert_eq!(report, DrainReport::default());
    }

    #[test]
    fn test_lifo_drains_newest_first() {
        let mut controller = AdmissionController::new(1, DrainOrder::Lifo);
        let mut sink = RecordingSink::default();

        for n in 0..4 {
            controller.offer(add(n), &mut sink);
        }
        while controller.pending_len() > 0 {
            controller.end_tick(&mut sink);
        }

        assert_eq!(sink.ids(), vec!["f0", "f3", "f2", "f1"]);
    }

    #[test]
    fn test_fifo_drains_oldest_first() {
        let mut controller = AdmissionController::new(1, DrainOrder::Fifo);
        let mut sink = RecordingSink::default();

        for n in 0..4 {
            controller.offer(add(n), &mut sink);
        }
        while controller.pending_len() > 0 {
            controller.end_tick(&mut sink);
        }

        assert_eq!(sink.ids(), vec!["f0", "f1", "f2", "f3"]);
    }

    #[test]
    fn test_remove_bypasses_saturation() {
        let mut controller = AdmissionController::new(1, DrainOrder::Lifo);
        let mut sink = RecordingSink::default();

        controller.offer(add(0), &mut sink);
        controller.offer(add(1), &mut sink);
        assert_eq!(controller.state(), AdmissionState::Saturated);

        let outcome = controller.offer(FeatureMessage::remove("tiles", "f0"), &mut sink);
        assert_eq!(outcome, Admission::Delivered);
        assert_eq!(sink.ids(), vec!["f0", "f0"]);
        assert_eq!(controller.counter(), 1, "removals are not counted");
    }

    #[test]
    fn test_remove_cancels_queued_add() {
        use crate::layer::{InMemoryLayer, LayerId};

        let mut registry = LayerRegistry::new();
        registry
            .register(LayerId::from("tiles"), Box::new(InMemoryLayer::new()))
            .unwrap();
        let mut controller = AdmissionController::new(1, DrainOrder::Lifo);

        assert_eq!(controller.offer(add(0), &mut registry), Admission::Delivered);
        assert_eq!(controller.offer(add(1), &mut registry), Admission::Queued);
        assert_eq!(
            controller.offer(FeatureMessage::remove("tiles", "f1"), &mut registry),
            Admission::Cancelled
        );
        assert_eq!(controller.pending_len(), 0);

        let report = controller.end_tick(&mut registry);
        assert_eq!(report, DrainReport::default());

        // f1 never reached the layer
        assert!(matches!(
            registry.remove(&LayerId::from("tiles"), "f1"),
            Err(LayerError::UnknownFeature(_))
        ));
        assert!(registry.remove(&LayerId::from("tiles"), "f0").is_ok());

        let stats = controller.stats();
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn test_cancel_only_matches_same_layer() {
        let mut controller = AdmissionController::new(1, DrainOrder::Fifo);
        let mut sink = RecordingSink::default();

        controller.offer(add(0), &mut sink);
        controller.offer(add(1), &mut sink);

        let outcome = controller.offer(FeatureMessage::remove("pois", "f1"), &mut sink);
        assert_eq!(outcome, Admission::Delivered);
        assert_eq!(controller.pending_len(), 1);

        controller.end_tick(&mut sink);
        assert_eq!(sink.ids(), vec!["f0", "f1", "f1"]);
    }

    #[test]
    fn test_drained_adds_count_against_next_tick() {
        let mut controller = AdmissionController::new(2, DrainOrder::Lifo);
        let mut sink = RecordingSink::default();

        for n in 0..4 {
            controller.offer(add(n), &mut sink);
        }
        controller.end_tick(&mut sink);
        assert_eq!(controller.counter(), 2);

        // New arrivals during the following tick must queue
        assert_eq!(controller.offer(add(9), &mut sink), Admission::Queued);
        assert_eq!(sink.delivered.len(), 4);
    }

    #[test]
    fn test_unsaturated_tick_admits_after_partial_drain() {
        let mut controller = AdmissionController::new(3, DrainOrder::Lifo);
        let mut sink = RecordingSink::default();

        for n in 0..4 {
            controller.offer(add(n), &mut sink);
        }
        controller.end_tick(&mut sink);
        assert_eq!(controller.counter(), 1);

        assert_eq!(controller.offer(add(10), &mut sink), Admission::Delivered);
        assert_eq!(controller.offer(add(11), &mut sink), Admission::Delivered);
        assert_eq!(controller.offer(add(12), &mut sink), Admission::Queued);
    }

    #[test]
    fn test_rejected_delivery_consumes_budget() {
        let mut controller = AdmissionController::new(2, DrainOrder::Lifo);
        let mut sink = RecordingSink {
            reject_layer: Some("ghost"),
            ..Default::default()
        };

        let outcome = controller.offer(FeatureMessage::add("ghost", "g1", json!(null)), &mut sink);
        assert!(matches!(outcome, Admission::Rejected(LayerError::UnknownLayer(_))));
        assert_eq!(controller.counter(), 1);

        // Processing continues for other layers
        assert_eq!(controller.offer(add(1), &mut sink), Admission::Delivered);
        assert_eq!(controller.stats().rejected, 1);
    }

    #[test]
    fn test_stats() {
        let mut controller = AdmissionController::new(1, DrainOrder::Lifo);
        let mut sink = RecordingSink::default();

        for n in 0..3 {
            controller.offer(add(n), &mut sink);
        }
        controller.offer(FeatureMessage::remove("tiles", "f0"), &mut sink);
        controller.end_tick(&mut sink);

        let stats = controller.stats();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.drained, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.queue_high_water, 2);
    }

    #[test]
    fn test_zero_limit_raised_to_one() {
        let controller = AdmissionController::new(0, DrainOrder::Fifo);
        assert_eq!(controller.limit(), 1);
    }

    #[test]
    fn test_drain_order_parse() {
        assert_eq!("LIFO".parse::<DrainOrder>(), Ok(DrainOrder::Lifo));
        assert_eq!(" fifo ".parse::<DrainOrder>(), Ok(DrainOrder::Fifo));
        assert!("stack".parse::<DrainOrder>().is_err());
    }

    #[test]
    fn test_registry_as_sink() {
        use crate::layer::{InMemoryLayer, LayerId};

        let mut registry = LayerRegistry::new();
        registry
            .register(LayerId::from("tiles"), Box::new(InMemoryLayer::new()))
            .unwrap();
        let mut controller = AdmissionController::new(5, DrainOrder::Lifo);

        assert_eq!(controller.offer(add(1), &mut registry), Admission::Delivered);
        assert_eq!(
            controller.offer(FeatureMessage::remove("tiles", "f1"), &mut registry),
            Admission::Delivered
        );
        assert!(matches!(
            controller.offer(FeatureMessage::remove("roads", "r1"), &mut registry),
            Admission::Rejected(LayerError::UnknownLayer(_))
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_per_tick_cap_holds(
                limit in 1usize..8,
                arrivals in proptest::collection::vec(0usize..20, 1..10),
            ) {
                let mut controller = AdmissionController::new(limit, DrainOrder::Lifo);
                let mut sink = RecordingSink::default();
                let mut next = 0;
                let total: usize = arrivals.iter().sum();

                // Deliveries in a tick = drain at the previous boundary + direct admissions.
                let mut carried = 0;
                for burst in &arrivals {
                    let before = sink.delivered.len();
                    for _ in 0..*burst {
                        controller.offer(add(next), &mut sink);
                        next += 1;
                    }
                    let direct = sink.delivered.len() - before;
                    prop_assert!(carried + direct <= limit);
                    prop_assert_eq!(direct, (*burst).min(limit - carried));
                    carried = controller.end_tick(&mut sink).delivered;
                }
                while controller.pending_len() > 0 {
                    let report = controller.end_tick(&mut sink);
                    prop_assert!(report.delivered <= limit);
                    prop_assert!(report.delivered > 0);
                }

                prop_assert_eq!(sink.delivered.len(), total);
            }
        }
    }
}
