//! Cross-channel event building.
//!
//! The builder walks each channel view once, splitting records into an event
//! stream and a step stream. Both streams are joined the same way: among the
//! channels with a pending record take the smallest timestamp; every channel
//! whose pending record carries that timestamp joins the event and advances,
//! the others are absent.

use crate::error::{CoreError, CoreResult};
use crate::record::{OwnedRecord, Record, RecordIter};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Predicate deciding whether an event is kept.
pub type FilterFn = dyn Fn(&Event<'_>) -> bool + Send + Sync;

/// Maps an event to the consumer that should receive it.
pub type DestinationFn = dyn Fn(&Event<'_>) -> Option<u32> + Send + Sync;

/// Options applied to every build.
#[derive(Clone)]
pub struct BuildOptions {
    /// Maximum number of accepted events per batch.
    pub batch_size: usize,
    /// Events for which this returns false are dropped.
    pub filter: Option<Arc<FilterFn>>,
    /// Tags each accepted event with a destination.
    pub destination: Option<Arc<DestinationFn>>,
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("batch_size", &self.batch_size)
            .field("filter", &self.filter.is_some())
            .field("destination", &self.destination.is_some())
            .finish()
    }
}

impl BuildOptions {
    /// Creates options with the given batch size and no filter.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            filter: None,
            destination: None,
        }
    }

    /// Sets the event filter.
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event<'_>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets the destination function.
    #[must_use]
    pub fn destination<F>(mut self, destination: F) -> Self
    where
        F: Fn(&Event<'_>) -> Option<u32> + Send + Sync + 'static,
    {
        self.destination = Some(Arc::new(destination));
        self
    }
}

/// Records sharing one timestamp, at most one per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<'a> {
    /// Shared timestamp.
    pub timestamp: u64,
    /// One slot per channel; `None` where the channel has no record.
    pub records: Vec<Option<Record<'a>>>,
    /// Consumer tag assigned by the destination function.
    pub destination: Option<u32>,
}

impl Event<'_> {
    /// Record of channel `i`, if present.
    #[must_use]
    pub fn record(&self, i: usize) -> Option<&Record<'_>> {
        self.records.get(i).and_then(Option::as_ref)
    }

    /// Number of channels contributing a record.
    #[must_use]
    pub fn present(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    /// Returns true if every channel contributed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.records.iter().all(Option::is_some)
    }

    /// Copies the event out of the channel buffers.
    #[must_use]
    pub fn to_owned_event(&self) -> OwnedEvent {
        OwnedEvent {
            timestamp: self.timestamp,
            records: self
                .records
                .iter()
                .map(|r| r.as_ref().map(Record::to_owned_record))
                .collect(),
            destination: self.destination,
        }
    }
}

/// An [`Event`] detached from the channel buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedEvent {
    /// Shared timestamp.
    pub timestamp: u64,
    /// One slot per channel.
    pub records: Vec<Option<OwnedRecord>>,
    /// Consumer tag.
    pub destination: Option<u32>,
}

/// A batch of events plus the steps that accompany them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Accepted events in timestamp order.
    pub events: Vec<Event<'a>>,
    /// Step records joined the same way as events.
    pub steps: Vec<Event<'a>>,
}

impl<'a> Batch<'a> {
    /// Number of events.
    #[must_use]
    pub fn nevents(&self) -> usize {
        self.events.len()
    }

    /// Number of steps.
    #[must_use]
    pub fn nsteps(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the batch holds neither events nor steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.steps.is_empty()
    }

    /// Groups events by destination, preserving order within each group.
    #[must_use]
    pub fn by_destination(&self) -> BTreeMap<Option<u32>, Vec<&Event<'a>>> {
        let mut groups: BTreeMap<Option<u32>, Vec<&Event<'a>>> = BTreeMap::new();
        for event in &self.events {
            groups.entry(event.destination).or_default().push(event);
        }
        groups
    }
}

#[derive(Debug, Default)]
struct Stream<'a> {
    records: Vec<Record<'a>>,
    cursor: usize,
}

impl<'a> Stream<'a> {
    fn peek(&self) -> Option<&Record<'a>> {
        self.records.get(self.cursor)
    }
}

fn next_timestamp(streams: &[Stream<'_>]) -> Option<u64> {
    streams
        .iter()
        .filter_map(|s| s.peek().map(Record::timestamp))
        .min()
}

fn join<'a>(streams: &mut [Stream<'a>]) -> Option<Event<'a>> {
    let timestamp = next_timestamp(streams)?;
    let records = streams
        .iter_mut()
        .map(|stream| match stream.peek() {
            Some(record) if record.timestamp() == timestamp => {
                let record = *record;
                stream.cursor += 1;
                Some(record)
            }
            _ => None,
        })
        .collect();
    Some(Event {
        timestamp,
        records,
        destination: None,
    })
}

/// Builds batches of events from one view per channel.
#[derive(Debug)]
pub struct EventBuilder<'a> {
    events: Vec<Stream<'a>>,
    steps: Vec<Stream<'a>>,
    nevents: usize,
    nsteps: usize,
}

impl<'a> EventBuilder<'a> {
    /// Creates a builder over `views`, one per channel.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if a view ends inside a record or
    /// carries an invalid header.
    pub fn new(views: &[&'a [u8]]) -> CoreResult<Self> {
        let mut events = Vec::with_capacity(views.len());
        let mut steps = Vec::with_capacity(views.len());
        for &view in views {
            let mut event_stream = Stream::default();
            let mut step_stream = Stream::default();
            for record in RecordIter::new(view) {
                let record = record?;
                if record.header.is_event() {
                    event_stream.records.push(record);
                } else {
                    step_stream.records.push(record);
                }
            }
            events.push(event_stream);
            steps.push(step_stream);
        }
        Ok(Self {
            events,
            steps,
            nevents: 0,
            nsteps: 0,
        })
    }

    /// Creates a builder from a footer-framed buffer of `n_channels` views.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the footer is inconsistent, or
    /// [`CoreError::CorruptRecord`] for a malformed view.
    pub fn from_framed(buf: &'a [u8], n_channels: usize) -> CoreResult<Self> {
        let views = smdflow_codec::decode(buf, n_channels)?;
        Self::new(&views)
    }

    /// Number of channels.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.events.len()
    }

    /// Events in the last built batch.
    #[must_use]
    pub fn nevents(&self) -> usize {
        self.nevents
    }

    /// Steps in the last built batch.
    #[must_use]
    pub fn nsteps(&self) -> usize {
        self.nsteps
    }

    /// Returns true once every record has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        next_timestamp(&self.events).is_none() && next_timestamp(&self.steps).is_none()
    }

    /// Builds the next batch.
    ///
    /// Accepts up to `batch_size` events; filtered events still advance the
    /// cursors but do not count. Steps at or before an accepted event are
    /// emitted ahead of it, and all remaining steps are emitted once the
    /// events run out. An empty batch means nothing is left.
    pub fn build(&mut self, options: &BuildOptions) -> Batch<'a> {
        let batch_size = options.batch_size.max(1);
        let mut batch = Batch::default();

        while batch.events.len() < batch_size {
            let Some(event_ts) = next_timestamp(&self.events) else {
                break;
            };
            while next_timestamp(&self.steps).is_some_and(|ts| ts <= event_ts) {
                if let Some(step) = join(&mut self.steps) {
                    batch.steps.push(step);
                }
            }

            let Some(mut event) = join(&mut self.events) else {
                break;
            };
            if let Some(filter) = &options.filter {
                if !filter(&event) {
                    continue;
                }
            }
            if let Some(destination) = &options.destination {
                event.destination = destination(&event);
            }
            batch.events.push(event);
        }

        if next_timestamp(&self.events).is_none() {
            while let Some(step) = join(&mut self.steps) {
                batch.steps.push(step);
            }
        }

        self.nevents = batch.events.len();
        self.nsteps = batch.steps.len();
        batch
    }

    /// Builds batches until one comes back empty.
    pub fn build_all(&mut self, options: &BuildOptions) -> Vec<Batch<'a>> {
        let mut batches = Vec::new();
        loop {
            let batch = self.build(options);
            if batch.is_empty() {
                return batches;
            }
            batches.push(batch);
        }
    }
}

/// Checks that `views` matches the expected channel count.
///
/// # Errors
///
/// Returns [`CoreError::ChannelCountMismatch`] otherwise.
pub fn check_channel_count<T>(views: &[T], expected: usize) -> CoreResult<()> {
    if views.len() == expected {
        Ok(())
    } else {
        Err(CoreError::ChannelCountMismatch {
            expected,
            actual: views.len(),
        })
    }
}
