//! Chunked reading of parallel channels.
//!
//! Each channel owns a fixed-capacity arena. Bytes are appended at the write
//! cursor; released records advance the read offset; consumed bytes are
//! compacted to the arena front before the next read. Views handed out by
//! [`ChunkedChannelReader::view`] borrow the arenas, so the borrow checker
//! forbids reading more while any view is alive.

use crate::config::PipelineConfig;
use crate::error::{CoreError, CoreResult};
use crate::record::{OwnedRecord, RecordHeader, RecordIter};
use bytes::Bytes;
use smdflow_storage::ChannelSource;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// A fully buffered record found while scanning a channel.
#[derive(Debug, Clone, Copy)]
struct Scanned {
    /// Offset one past the record, relative to the read offset.
    end: usize,
    timestamp: u64,
    is_event: bool,
}

struct ChannelBuffer {
    source: Box<dyn ChannelSource>,
    arena: Vec<u8>,
    start: usize,
    end: usize,
    overflow: bool,
    warned_truncated: bool,
}

impl ChannelBuffer {
    fn new(source: Box<dyn ChannelSource>, capacity: usize) -> Self {
        Self {
            source,
            arena: vec![0; capacity],
            start: 0,
            end: 0,
            overflow: false,
            warned_truncated: false,
        }
    }

    fn pending(&self) -> &[u8] {
        &self.arena[self.start..self.end]
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.arena.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    fn fill(&mut self) -> CoreResult<usize> {
        if self.end == self.arena.len() || self.source.is_ended() {
            return Ok(0);
        }
        let n = self.source.read(&mut self.arena[self.end..])?;
        self.end += n;
        Ok(n)
    }

    fn check_overflow(&mut self, channel: usize) -> CoreResult<()> {
        if let Some(size) = RecordHeader::peek_size(self.pending()) {
            if size > self.arena.len() {
                self.overflow = true;
                return Err(CoreError::ChunkOverflow {
                    channel,
                    record_size: size,
                    chunk_size: self.arena.len(),
                });
            }
        }
        Ok(())
    }

    fn has_record(&self) -> bool {
        let pending = self.pending();
        matches!(RecordHeader::peek_size(pending), Some(size) if size <= pending.len())
    }

    fn is_ended(&self) -> bool {
        self.source.is_ended()
    }

    /// Length of the prefix of pending bytes made of whole records.
    fn complete_len(&self) -> usize {
        let pending = self.pending();
        let mut offset = 0;
        while let Some(size) = RecordHeader::peek_size(&pending[offset..]) {
            if offset + size > pending.len() {
                break;
            }
            offset += size;
        }
        offset
    }

    fn scan(&self) -> CoreResult<Vec<Scanned>> {
        let complete = &self.pending()[..self.complete_len()];
        let mut out = Vec::new();
        let mut iter = RecordIter::new(complete);
        while let Some(record) = iter.next() {
            let record = record?;
            out.push(Scanned {
                end: iter.offset(),
                timestamp: record.timestamp(),
                is_event: record.header.is_event(),
            });
        }
        Ok(out)
    }
}

/// Reads N channels in bounded chunks and releases time-aligned windows.
pub struct ChunkedChannelReader {
    channels: Vec<ChannelBuffer>,
    chunk_size: usize,
    max_retries: u32,
    retry_delay: Duration,
    got: usize,
    min_ts: Option<u64>,
    max_ts: Option<u64>,
}

impl std::fmt::Debug for ChunkedChannelReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedChannelReader")
            .field("n_channels", &self.channels.len())
            .field("chunk_size", &self.chunk_size)
            .field("got", &self.got)
            .finish_non_exhaustive()
    }
}

impl ChunkedChannelReader {
    /// Creates a reader over `sources` using the buffer and retry settings of
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoChannels`] for an empty source list, or
    /// [`CoreError::InvalidConfig`] if `config` does not validate.
    pub fn new(sources: Vec<Box<dyn ChannelSource>>, config: &PipelineConfig) -> CoreResult<Self> {
        if sources.is_empty() {
            return Err(CoreError::NoChannels);
        }
        config.validate()?;
        Ok(Self {
            channels: sources
                .into_iter()
                .map(|s| ChannelBuffer::new(s, config.chunk_size))
                .collect(),
            chunk_size: config.chunk_size,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            got: 0,
            min_ts: None,
            max_ts: None,
        })
    }

    /// Number of channels.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Capacity of each channel buffer.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes read by the last [`Self::read_more`].
    #[must_use]
    pub fn got(&self) -> usize {
        self.got
    }

    /// Smallest timestamp released so far.
    #[must_use]
    pub fn min_ts(&self) -> Option<u64> {
        self.min_ts
    }

    /// Largest timestamp released so far.
    #[must_use]
    pub fn max_ts(&self) -> Option<u64> {
        self.max_ts
    }

    /// Returns true once a record too large for the buffer has been seen.
    #[must_use]
    pub fn has_overflow(&self) -> bool {
        self.channels.iter().any(|c| c.overflow)
    }

    /// Returns true when every source has ended and no whole record is left.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.channels.iter().all(|c| c.is_ended() && !c.has_record())
    }

    /// Reads more bytes into every channel that has room.
    ///
    /// Consumed bytes are compacted first. When nothing arrives on any
    /// channel and not every source has ended, the read is retried up to
    /// `max_retries` times, `retry_delay` apart.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChunkOverflow`] if a channel's next record is
    /// larger than the chunk capacity, or a storage error from a source.
    pub fn read_more(&mut self) -> CoreResult<usize> {
        let mut attempt = 0;
        loop {
            let mut total = 0;
            for (index, channel) in self.channels.iter_mut().enumerate() {
                channel.compact();
                total += channel.fill()?;
                channel.check_overflow(index)?;

                if channel.is_ended()
                    && !channel.has_record()
                    && !channel.pending().is_empty()
                    && !channel.warned_truncated
                {
                    channel.warned_truncated = true;
                    warn!(
                        "channel {} ({}) ended with {} bytes of a partial record",
                        index,
                        channel.source.name(),
                        channel.pending().len()
                    );
                }
            }
            self.got = total;

            let all_ended = self.channels.iter().all(ChannelBuffer::is_ended);
            if total > 0 || all_ended {
                return Ok(total);
            }
            if attempt >= self.max_retries {
                if self.max_retries > 0 {
                    warn!("no data after {} retries, treating as end of stream", attempt);
                }
                return Ok(0);
            }
            attempt += 1;
            debug!(
                "no data available, retry {}/{} in {:?}",
                attempt, self.max_retries, self.retry_delay
            );
            thread::sleep(self.retry_delay);
        }
    }

    /// Returns true when every channel holds at least one whole record or
    /// has ended, and at least one channel holds a record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let mut any = false;
        for channel in &self.channels {
            if channel.has_record() {
                any = true;
            } else if !channel.is_ended() {
                return false;
            }
        }
        any
    }

    /// Releases up to `n` distinct event timestamps across all channels.
    ///
    /// Only records no channel can still precede are released: the limit is
    /// the smallest last-buffered timestamp among channels that have not
    /// ended. Step records at or below the limit travel with the window.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if a buffered header is invalid.
    pub fn view(&mut self, n: usize) -> CoreResult<Window<'_>> {
        if n == 0 {
            return Ok(Window::empty(self.channels.len()));
        }

        let scans = self
            .channels
            .iter()
            .map(ChannelBuffer::scan)
            .collect::<CoreResult<Vec<_>>>()?;

        let mut limit = u64::MAX;
        for (channel, scan) in self.channels.iter().zip(&scans) {
            if channel.is_ended() {
                continue;
            }
            match scan.last() {
                Some(last) => limit = limit.min(last.timestamp),
                None => return Ok(Window::empty(self.channels.len())),
            }
        }

        let mut event_ts: Vec<u64> = scans
            .iter()
            .flat_map(|scan| scan.iter().take_while(|e| e.timestamp <= limit))
            .filter(|e| e.is_event)
            .map(|e| e.timestamp)
            .collect();
        event_ts.sort_unstable();
        event_ts.dedup();
        if event_ts.len() > n {
            limit = event_ts[n - 1];
        }
        let nevents = event_ts.len().min(n);

        let lens: Vec<usize> = scans
            .iter()
            .map(|scan| {
                scan.iter()
                    .take_while(|e| e.timestamp <= limit)
                    .last()
                    .map_or(0, |e| e.end)
            })
            .collect();

        for (scan, &len) in scans.iter().zip(&lens) {
            for entry in scan.iter().take_while(|e| e.end <= len) {
                self.min_ts = Some(self.min_ts.map_or(entry.timestamp, |m| m.min(entry.timestamp)));
                self.max_ts = Some(self.max_ts.map_or(entry.timestamp, |m| m.max(entry.timestamp)));
            }
        }

        let mut ranges = Vec::with_capacity(self.channels.len());
        for (channel, &len) in self.channels.iter_mut().zip(&lens) {
            ranges.push((channel.start, channel.start + len));
            channel.start += len;
        }

        let views = self
            .channels
            .iter()
            .zip(ranges)
            .map(|(channel, (begin, end))| &channel.arena[begin..end])
            .collect();

        Ok(Window { views, nevents })
    }

    /// Copies out the first record of every channel.
    ///
    /// Used for the configuration handshake. Returns `None` unless every
    /// channel has a whole record buffered.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if a header is invalid.
    pub fn take_first(&mut self) -> CoreResult<Option<Vec<OwnedRecord>>> {
        if !self.channels.iter().all(ChannelBuffer::has_record) {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(self.channels.len());
        for channel in &mut self.channels {
            let pending = channel.pending();
            let header = RecordHeader::decode(pending)?;
            let bytes = Bytes::copy_from_slice(&pending[..header.size()]);
            records.push(OwnedRecord::from_bytes(bytes)?);
            channel.start += header.size();
        }
        Ok(Some(records))
    }
}

/// Per-channel borrowed views released by [`ChunkedChannelReader::view`].
#[derive(Debug, Clone)]
pub struct Window<'a> {
    views: Vec<&'a [u8]>,
    nevents: usize,
}

impl<'a> Window<'a> {
    fn empty(n_channels: usize) -> Self {
        Self {
            views: vec![&[][..]; n_channels],
            nevents: 0,
        }
    }

    /// One view per channel, in channel order.
    #[must_use]
    pub fn views(&self) -> &[&'a [u8]] {
        &self.views
    }

    /// Consumes the window, returning the views.
    #[must_use]
    pub fn into_views(self) -> Vec<&'a [u8]> {
        self.views
    }

    /// Number of distinct event timestamps in the window.
    #[must_use]
    pub fn nevents(&self) -> usize {
        self.nevents
    }

    /// Returns true if no channel released anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.iter().all(|v| v.is_empty())
    }

    /// Total bytes released across channels.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.views.iter().map(|v| v.len()).sum()
    }

    /// Owned copies of the step records of each channel.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if a view is malformed.
    pub fn step_bytes(&self) -> CoreResult<Vec<Vec<u8>>> {
        self.views
            .iter()
            .map(|view| {
                let mut steps = Vec::new();
                for record in RecordIter::new(view) {
                    let record = record?;
                    if !record.header.is_event() {
                        steps.extend_from_slice(record.as_bytes());
                    }
                }
                Ok(steps)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode_record, TransitionId};
    use smdflow_storage::InMemorySource;

    fn rec(ts: u64, transition: TransitionId, payload: &[u8]) -> Vec<u8> {
        encode_record(&RecordHeader::new(ts, transition), payload).unwrap()
    }

    fn channel(records: &[(u64, TransitionId)]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|&(ts, t)| rec(ts, t, b"pp"))
            .collect()
    }

    fn reader(channels: Vec<Vec<u8>>, chunk_size: usize) -> ChunkedChannelReader {
        let sources: Vec<Box<dyn ChannelSource>> = channels
            .into_iter()
            .map(|c| Box::new(InMemorySource::with_data(c)) as Box<dyn ChannelSource>)
            .collect();
        let config = PipelineConfig::new()
            .chunk_size(chunk_size)
            .retry_delay(Duration::ZERO);
        ChunkedChannelReader::new(sources, &config).unwrap()
    }

    fn timestamps(view: &[u8]) -> Vec<u64> {
        RecordIter::new(view).map(|r| r.unwrap().timestamp()).collect()
    }

    #[test]
    fn no_channels_rejected() {
        let err = ChunkedChannelReader::new(Vec::new(), &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::NoChannels));
    }

    #[test]
    fn reads_and_releases_everything_when_ended() {
        let c0 = channel(&[(1, TransitionId::L1Accept), (2, TransitionId::L1Accept)]);
        let c1 = channel(&[(1, TransitionId::L1Accept), (3, TransitionId::L1Accept)]);
        let mut reader = reader(vec![c0, c1], 1024);

        assert!(!reader.is_complete());
        assert!(reader.read_more().unwrap() > 0);
        assert!(reader.is_complete());

        let window = reader.view(100).unwrap();
        assert_eq!(window.nevents(), 3);
        assert_eq!(timestamps(window.views()[0]), vec![1, 2]);
        assert_eq!(timestamps(window.views()[1]), vec![1, 3]);

        assert!(!reader.is_complete());
        assert!(reader.is_exhausted());
        assert_eq!(reader.min_ts(), Some(1));
        assert_eq!(reader.max_ts(), Some(3));
    }

    #[test]
    fn view_caps_distinct_event_timestamps() {
        let c0 = channel(&[
            (1, TransitionId::L1Accept),
            (2, TransitionId::L1Accept),
            (3, TransitionId::L1Accept),
        ]);
        let c1 = channel(&[(2, TransitionId::L1Accept), (3, TransitionId::L1Accept)]);
        let mut reader = reader(vec![c0, c1], 1024);
        reader.read_more().unwrap();

        let window = reader.view(2).unwrap();
        assert_eq!(window.nevents(), 2);
        assert_eq!(timestamps(window.views()[0]), vec![1, 2]);
        assert_eq!(timestamps(window.views()[1]), vec![2]);

        let window = reader.view(2).unwrap();
        assert_eq!(window.nevents(), 1);
        assert_eq!(timestamps(window.views()[0]), vec![3]);
        assert_eq!(timestamps(window.views()[1]), vec![3]);
    }

    #[test]
    fn live_channel_holds_back_later_records() {
        let c0 = channel(&[
            (1, TransitionId::L1Accept),
            (5, TransitionId::L1Accept),
            (9, TransitionId::L1Accept),
        ]);
        let (live, writer) = InMemorySource::live();
        writer.append(&channel(&[(2, TransitionId::L1Accept), (5, TransitionId::L1Accept)])).unwrap();

        let sources: Vec<Box<dyn ChannelSource>> =
            vec![Box::new(InMemorySource::with_data(c0)), Box::new(live)];
        let config = PipelineConfig::new().chunk_size(1024);
        let mut reader = ChunkedChannelReader::new(sources, &config).unwrap();
        reader.read_more().unwrap();

        let window = reader.view(100).unwrap();
        assert_eq!(timestamps(window.views()[0]), vec![1, 5]);
        assert_eq!(timestamps(window.views()[1]), vec![2, 5]);
        assert_eq!(window.nevents(), 3);

        assert!(!reader.is_complete());
        writer.finish();
        reader.read_more().unwrap();
        assert!(reader.is_complete());
        let window = reader.view(100).unwrap();
        assert_eq!(timestamps(window.views()[0]), vec![9]);
        assert!(window.views()[1].is_empty());
    }

    #[test]
    fn steps_travel_with_window() {
        let c0 = channel(&[
            (1, TransitionId::BeginStep),
            (2, TransitionId::L1Accept),
            (3, TransitionId::EndStep),
        ]);
        let mut reader = reader(vec![c0], 1024);
        reader.read_more().unwrap();

        let window = reader.view(10).unwrap();
        assert_eq!(window.nevents(), 1);
        let steps = window.step_bytes().unwrap();
        assert_eq!(timestamps(&steps[0]), vec![1, 3]);
    }

    #[test]
    fn small_chunks_compact_and_continue() {
        let records: Vec<(u64, TransitionId)> =
            (1..=20).map(|ts| (ts, TransitionId::L1Accept)).collect();
        let size = rec(0, TransitionId::L1Accept, b"pp").len();
        let mut reader = reader(vec![channel(&records)], size * 3 + 5);

        let mut seen = Vec::new();
        loop {
            while !reader.is_complete() {
                if reader.read_more().unwrap() == 0 {
                    break;
                }
            }
            if !reader.is_complete() {
                break;
            }
            let window = reader.view(100).unwrap();
            seen.extend(timestamps(window.views()[0]));
        }
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn oversized_record_overflows() {
        let big = rec(1, TransitionId::L1Accept, &[0u8; 200]);
        let mut reader = reader(vec![big], 64);
        match reader.read_more() {
            Err(CoreError::ChunkOverflow {
                channel,
                record_size,
                chunk_size,
            }) => {
                assert_eq!(channel, 0);
                assert_eq!(record_size, 224);
                assert_eq!(chunk_size, 64);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
        assert!(reader.has_overflow());
    }

    #[test]
    fn stall_retries_then_gives_up() {
        let (live, _writer) = InMemorySource::live();
        let sources: Vec<Box<dyn ChannelSource>> = vec![Box::new(live)];
        let config = PipelineConfig::new()
            .chunk_size(1024)
            .max_retries(2)
            .retry_delay(Duration::from_millis(1));
        let mut reader = ChunkedChannelReader::new(sources, &config).unwrap();
        assert_eq!(reader.read_more().unwrap(), 0);
        assert!(!reader.is_complete());
        assert!(!reader.is_exhausted());
    }

    #[test]
    fn stall_recovers_when_bytes_arrive() {
        let (live, writer) = InMemorySource::live();
        let sources: Vec<Box<dyn ChannelSource>> = vec![Box::new(live)];
        let config = PipelineConfig::new()
            .chunk_size(1024)
            .max_retries(500)
            .retry_delay(Duration::from_millis(2));
        let mut reader = ChunkedChannelReader::new(sources, &config).unwrap();

        let append = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.append(&rec(7, TransitionId::L1Accept, b"late")).unwrap();
            writer.finish();
        });
        let got = reader.read_more().unwrap();
        append.join().unwrap();

        assert!(got > 0);
        let window = reader.view(10).unwrap();
        assert_eq!(timestamps(window.views()[0]), vec![7]);
    }

    #[test]
    fn take_first_copies_configs() {
        let c0 = channel(&[(0, TransitionId::Configure), (4, TransitionId::L1Accept)]);
        let c1 = channel(&[(0, TransitionId::Configure)]);
        let mut reader = reader(vec![c0, c1], 1024);
        reader.read_more().unwrap();

        let configs = reader.take_first().unwrap().unwrap();
        assert_eq!(configs.len(), 2);
        assert!(configs
            .iter()
            .all(|r| r.header.transition == TransitionId::Configure));

        assert!(reader.take_first().unwrap().is_none());
        let window = reader.view(10).unwrap();
        assert_eq!(timestamps(window.views()[0]), vec![4]);
    }

    #[test]
    fn zero_window_releases_nothing() {
        let mut reader = reader(vec![channel(&[(1, TransitionId::L1Accept)])], 1024);
        reader.read_more().unwrap();
        let window = reader.view(0).unwrap();
        assert!(window.is_empty());
        assert!(reader.is_complete());
    }
}
