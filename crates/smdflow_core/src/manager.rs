//! Pull-based driver over a [`ChunkedChannelReader`].

use crate::builder::{Batch, BuildOptions, DestinationFn, Event, EventBuilder, FilterFn};
use crate::config::PipelineConfig;
use crate::error::CoreResult;
use crate::reader::ChunkedChannelReader;
use crate::record::OwnedRecord;
use bytes::Bytes;
use smdflow_storage::ChannelSource;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Where the manager is in its read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Buffers do not yet hold a releasable record on every live channel.
    NeedMoreData,
    /// A window can be released.
    Complete,
    /// The last window has been handed out.
    Consumed,
}

/// Reads channels, releases windows and hands out batch iterators.
///
/// # Example
///
/// ```rust,no_run
/// use smdflow_core::{PipelineConfig, SmdReaderManager};
/// use smdflow_storage::{ChannelSource, FileSource};
/// use std::path::Path;
///
/// let sources: Vec<Box<dyn ChannelSource>> =
///     vec![Box::new(FileSource::open(Path::new("s000.smd.xtc2")).unwrap())];
/// let mut manager = SmdReaderManager::new(sources, PipelineConfig::default()).unwrap();
///
/// let configs = manager.get_next_dgrams().unwrap();
/// while let Some(batches) = manager.next_batch_iter().unwrap() {
///     for batch in batches {
///         println!("{} events", batch.nevents());
///     }
/// }
/// ```
#[derive(Debug)]
pub struct SmdReaderManager {
    reader: ChunkedChannelReader,
    config: PipelineConfig,
    options: BuildOptions,
    state: ReaderState,
    processed_events: u64,
    got_events: usize,
    bytes_read: u64,
    configs: Option<Vec<OwnedRecord>>,
}

impl SmdReaderManager {
    /// Creates a manager over `sources`.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no sources or `config` is invalid.
    pub fn new(sources: Vec<Box<dyn ChannelSource>>, config: PipelineConfig) -> CoreResult<Self> {
        let reader = ChunkedChannelReader::new(sources, &config)?;
        Ok(Self {
            reader,
            options: BuildOptions::new(config.batch_size),
            config,
            state: ReaderState::NeedMoreData,
            processed_events: 0,
            got_events: 0,
            bytes_read: 0,
            configs: None,
        })
    }

    /// Sets the event filter applied by batch iterators.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event<'_>) -> bool + Send + Sync + 'static,
    {
        self.options.filter = Some(Arc::new(filter) as Arc<FilterFn>);
        self
    }

    /// Sets the destination function applied by batch iterators.
    #[must_use]
    pub fn with_destination<F>(mut self, destination: F) -> Self
    where
        F: Fn(&Event<'_>) -> Option<u32> + Send + Sync + 'static,
    {
        self.options.destination = Some(Arc::new(destination) as Arc<DestinationFn>);
        self
    }

    /// Number of channels.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.reader.n_channels()
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current read-cycle state.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Events released so far.
    #[must_use]
    pub fn processed_events(&self) -> u64 {
        self.processed_events
    }

    /// Events in the last released window.
    #[must_use]
    pub fn got_events(&self) -> usize {
        self.got_events
    }

    /// Total bytes read from all channels.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Smallest timestamp released so far.
    #[must_use]
    pub fn min_ts(&self) -> Option<u64> {
        self.reader.min_ts()
    }

    /// Largest timestamp released so far.
    #[must_use]
    pub fn max_ts(&self) -> Option<u64> {
        self.reader.max_ts()
    }

    /// The first records returned by [`Self::get_next_dgrams`].
    #[must_use]
    pub fn configs(&self) -> Option<&[OwnedRecord]> {
        self.configs.as_deref()
    }

    fn max_reached(&self) -> bool {
        self.config.max_events > 0 && self.processed_events >= self.config.max_events
    }

    fn budget(&self) -> usize {
        let n = self.config.smd_n_events;
        if self.config.max_events == 0 {
            return n;
        }
        let remaining = self.config.max_events.saturating_sub(self.processed_events);
        usize::try_from(remaining).map_or(n, |r| r.min(n))
    }

    fn ensure_complete(&mut self) -> CoreResult<bool> {
        while !self.reader.is_complete() {
            self.state = ReaderState::NeedMoreData;
            let started = Instant::now();
            let got = self.reader.read_more()?;
            if got == 0 {
                return Ok(false);
            }
            self.bytes_read += got as u64;

            let mb = got as f64 / 1e6;
            let secs = started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 { mb / secs } else { 0.0 };
            info!(
                "read {:.3} MB from {} channels ({:.1} MB/s)",
                mb,
                self.reader.n_channels(),
                rate
            );
        }
        self.state = ReaderState::Complete;
        Ok(true)
    }

    /// Returns one copied record per channel.
    ///
    /// The first result is kept as the run configuration. Returns `None`
    /// once `max_events` is reached or the data is exhausted.
    ///
    /// # Errors
    ///
    /// Returns read, overflow or corrupt record errors.
    pub fn get_next_dgrams(&mut self) -> CoreResult<Option<Vec<OwnedRecord>>> {
        if self.max_reached() || !self.ensure_complete()? {
            return Ok(None);
        }
        let records = self.reader.take_first()?;
        if let Some(records) = &records {
            self.state = ReaderState::Consumed;
            if self.configs.is_none() {
                self.configs = Some(records.clone());
            }
        }
        Ok(records)
    }

    /// Releases the next window and returns an iterator over its batches.
    ///
    /// The window holds up to `smd_n_events` events, further capped so the
    /// processed count never exceeds `max_events`. Returns `None` at end of
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns read, overflow or corrupt record errors.
    pub fn next_batch_iter(&mut self) -> CoreResult<Option<BatchIterator<'_>>> {
        if self.max_reached() || !self.ensure_complete()? {
            return Ok(None);
        }

        let n = self.budget();
        let window = self.reader.view(n)?;
        let nevents = window.nevents();
        let builder = EventBuilder::new(window.views())?;

        self.state = ReaderState::Consumed;
        self.got_events = nevents;
        self.processed_events += nevents as u64;
        debug!(
            "released window of {} events ({} processed)",
            nevents, self.processed_events
        );

        Ok(Some(BatchIterator {
            builder,
            options: self.options.clone(),
            done: false,
        }))
    }

    /// Returns an iterator of owned, footer-framed chunks.
    pub fn chunks(&mut self) -> Chunks<'_> {
        Chunks {
            manager: self,
            done: false,
        }
    }
}

/// Batches built from one released window.
#[derive(Debug)]
pub struct BatchIterator<'a> {
    builder: EventBuilder<'a>,
    options: BuildOptions,
    done: bool,
}

impl<'a> BatchIterator<'a> {
    /// Number of channels.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.builder.n_channels()
    }
}

impl<'a> Iterator for BatchIterator<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Batch<'a>> {
        if self.done {
            return None;
        }
        let batch = self.builder.build(&self.options);
        if batch.is_empty() {
            self.done = true;
            return None;
        }
        Some(batch)
    }
}

impl FusedIterator for BatchIterator<'_> {}

/// A released window copied out of the channel buffers.
///
/// `smd` holds one view per channel and `steps` the step records of each
/// channel, both framed with a packet footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmdChunk {
    /// Framed per-channel views.
    pub smd: Bytes,
    /// Framed per-channel step records.
    pub steps: Bytes,
    /// Distinct event timestamps in the window.
    pub nevents: usize,
}

impl SmdChunk {
    /// Splits `smd` back into channel views.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the footer does not match `n_channels`.
    pub fn smd_views(&self, n_channels: usize) -> CoreResult<Vec<Bytes>> {
        Ok(smdflow_codec::decode_bytes(&self.smd, n_channels)?)
    }

    /// Splits `steps` back into channel step buffers.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the footer does not match `n_channels`.
    pub fn step_views(&self, n_channels: usize) -> CoreResult<Vec<Bytes>> {
        Ok(smdflow_codec::decode_bytes(&self.steps, n_channels)?)
    }

    /// Creates an event builder over the chunk.
    ///
    /// # Errors
    ///
    /// Returns a codec or corrupt record error.
    pub fn builder(&self, n_channels: usize) -> CoreResult<EventBuilder<'_>> {
        EventBuilder::from_framed(&self.smd, n_channels)
    }
}

/// Iterator returned by [`SmdReaderManager::chunks`].
#[derive(Debug)]
pub struct Chunks<'m> {
    manager: &'m mut SmdReaderManager,
    done: bool,
}

impl Chunks<'_> {
    fn next_chunk(&mut self) -> CoreResult<Option<SmdChunk>> {
        let manager = &mut *self.manager;
        if manager.max_reached() || !manager.ensure_complete()? {
            return Ok(None);
        }

        let n = manager.budget();
        let window = manager.reader.view(n)?;
        let nevents = window.nevents();
        let smd = smdflow_codec::encode(window.views())?;
        let steps = smdflow_codec::encode(&window.step_bytes()?)?;

        manager.state = ReaderState::Consumed;
        manager.got_events = nevents;
        manager.processed_events += nevents as u64;

        Ok(Some(SmdChunk {
            smd: Bytes::from(smd),
            steps: Bytes::from(steps),
            nevents,
        }))
    }
}

impl Iterator for Chunks<'_> {
    type Item = CoreResult<SmdChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Chunks<'_> {}
