//! Cross-crate integration test helpers.
//!
//! Provides a harness that runs channels through the storage, reader and
//! builder layers and checks the joined events.

use crate::fixtures::{sources, ChannelBuilder};
use smdflow_core::{PipelineConfig, SmdReaderManager};
use std::collections::BTreeMap;

/// Which channels contributed to each event, keyed by timestamp.
pub type Presence = Vec<(u64, Vec<bool>)>;

/// Result of running a [`JoinHarness`].
#[derive(Debug, Clone, Default)]
pub struct JoinOutcome {
    /// Events in delivery order.
    pub events: Presence,
    /// Size of every non-empty batch.
    pub batch_sizes: Vec<usize>,
    /// Events counted by the manager.
    pub processed: u64,
    /// Number of windows released.
    pub windows: usize,
}

/// Runs event timestamps through a full reader pipeline.
pub struct JoinHarness {
    channels: Vec<Vec<u64>>,
    config: PipelineConfig,
}

impl JoinHarness {
    /// Creates a harness over channels of event timestamps.
    ///
    /// Every channel starts with a configure record.
    pub fn new(channels: Vec<Vec<u64>>) -> Self {
        Self {
            channels,
            config: PipelineConfig::default(),
        }
    }

    /// Uses `config` for the reader.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// The expected join: the sorted union of timestamps with per-channel
    /// presence, truncated to `max_events` when set.
    pub fn expected(&self) -> Presence {
        let mut joined: BTreeMap<u64, Vec<bool>> = BTreeMap::new();
        for (i, channel) in self.channels.iter().enumerate() {
            for ts in channel {
                joined
                    .entry(*ts)
                    .or_insert_with(|| vec![false; self.channels.len()])[i] = true;
            }
        }
        let mut events: Presence = joined.into_iter().collect();
        if self.config.max_events > 0 {
            events.truncate(self.config.max_events as usize);
        }
        events
    }

    /// Builds a manager over fresh in-memory sources.
    pub fn manager(&self) -> SmdReaderManager {
        let channels = self
            .channels
            .iter()
            .map(|ts| ChannelBuilder::new().configure().events(ts))
            .collect();
        SmdReaderManager::new(sources(channels), self.config.clone())
            .expect("Failed to create manager")
    }

    /// Runs the pipeline to exhaustion.
    pub fn run(&self) -> JoinOutcome {
        let mut manager = self.manager();
        manager.get_next_dgrams().expect("Failed to read configs");

        let mut outcome = JoinOutcome::default();
        while let Some(batches) = manager.next_batch_iter().expect("Failed to read window") {
            outcome.windows += 1;
            for batch in batches {
                if batch.nevents() > 0 {
                    outcome.batch_sizes.push(batch.nevents());
                }
                outcome.events.extend(
                    batch
                        .events
                        .iter()
                        .map(|e| (e.timestamp, e.records.iter().map(Option::is_some).collect())),
                );
            }
        }
        outcome.processed = manager.processed_events();
        outcome
    }

    /// Runs the pipeline and asserts the join, batch sizes and event count.
    pub fn verify(&self) -> JoinOutcome {
        let outcome = self.run();
        assert_eq!(outcome.events, self.expected(), "Joined events differ");
        for size in &outcome.batch_sizes {
            assert!(
                *size <= self.config.batch_size,
                "Batch of {} exceeds {}",
                size,
                self.config.batch_size
            );
        }
        assert_eq!(outcome.processed, outcome.events.len() as u64);
        outcome
    }
}
