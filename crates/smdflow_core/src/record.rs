//! Record header format and borrowed/owned record types.
//!
//! Every record starts with a fixed 24-byte little-endian header:
//!
//! ```text
//! +-----------+--------+-----------+--------+---------+--------+
//! | timestamp | env    | source_id | damage | type_id | extent |
//! | u64       | u32    | u32       | u16    | u16     | u32    |
//! +-----------+--------+-----------+--------+---------+--------+
//! ```
//!
//! `extent` is the number of payload bytes following the header. The
//! transition id lives in bits 24..28 of `env`.

use crate::error::{CoreError, CoreResult};
use bytes::Bytes;

/// Size of the record header in bytes.
pub const HEADER_SIZE: usize = 24;

const TRANSITION_SHIFT: u32 = 24;
const TRANSITION_MASK: u32 = 0xF;

/// Kind of record, carried in the header `env` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransitionId {
    /// Clear readout.
    ClearReadout = 0,
    /// Reset.
    Reset = 1,
    /// Configure (first record of every channel).
    Configure = 2,
    /// Unconfigure.
    Unconfigure = 3,
    /// Begin run.
    BeginRun = 4,
    /// End run.
    EndRun = 5,
    /// Begin step.
    BeginStep = 6,
    /// End step.
    EndStep = 7,
    /// Enable.
    Enable = 8,
    /// Disable.
    Disable = 9,
    /// Slow update.
    SlowUpdate = 10,
    /// Event readout.
    L1Accept = 12,
}

impl TransitionId {
    /// Converts a byte to a transition id.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::ClearReadout),
            1 => Some(Self::Reset),
            2 => Some(Self::Configure),
            3 => Some(Self::Unconfigure),
            4 => Some(Self::BeginRun),
            5 => Some(Self::EndRun),
            6 => Some(Self::BeginStep),
            7 => Some(Self::EndStep),
            8 => Some(Self::Enable),
            9 => Some(Self::Disable),
            10 => Some(Self::SlowUpdate),
            12 => Some(Self::L1Accept),
            _ => None,
        }
    }

    /// Converts the transition id to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns true for event records; everything else is a step.
    #[must_use]
    pub const fn is_event(self) -> bool {
        matches!(self, Self::L1Accept)
    }
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Seconds in the high 32 bits, nanoseconds in the low 32 bits.
    pub timestamp: u64,
    /// Transition kind.
    pub transition: TransitionId,
    /// Producing source.
    pub source_id: u32,
    /// Damage bits.
    pub damage: u16,
    /// Payload type.
    pub type_id: u16,
    /// Payload length in bytes.
    pub extent: u32,
}

impl RecordHeader {
    /// Creates a header with no payload.
    #[must_use]
    pub const fn new(timestamp: u64, transition: TransitionId) -> Self {
        Self {
            timestamp,
            transition,
            source_id: 0,
            damage: 0,
            type_id: 0,
            extent: 0,
        }
    }

    /// Sets the source id.
    #[must_use]
    pub const fn with_source(mut self, source_id: u32) -> Self {
        self.source_id = source_id;
        self
    }

    /// Sets the payload type.
    #[must_use]
    pub const fn with_type(mut self, type_id: u16) -> Self {
        self.type_id = type_id;
        self
    }

    /// Sets the damage bits.
    #[must_use]
    pub const fn with_damage(mut self, damage: u16) -> Self {
        self.damage = damage;
        self
    }

    /// Total record size (header plus payload).
    #[must_use]
    pub const fn size(&self) -> usize {
        HEADER_SIZE + self.extent as usize
    }

    /// Returns true for event records.
    #[must_use]
    pub const fn is_event(&self) -> bool {
        self.transition.is_event()
    }

    /// Seconds part of the timestamp.
    #[must_use]
    pub const fn seconds(&self) -> u32 {
        (self.timestamp >> 32) as u32
    }

    /// Nanoseconds part of the timestamp.
    #[must_use]
    pub const fn nanoseconds(&self) -> u32 {
        (self.timestamp & 0xFFFF_FFFF) as u32
    }

    /// Serializes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let env = u32::from(self.transition.as_byte()) << TRANSITION_SHIFT;
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8..12].copy_from_slice(&env.to_le_bytes());
        out[12..16].copy_from_slice(&self.source_id.to_le_bytes());
        out[16..18].copy_from_slice(&self.damage.to_le_bytes());
        out[18..20].copy_from_slice(&self.type_id.to_le_bytes());
        out[20..24].copy_from_slice(&self.extent.to_le_bytes());
        out
    }

    /// Decodes a header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if fewer than [`HEADER_SIZE`]
    /// bytes are available or the transition id is unknown.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let Some(raw) = bytes.get(..HEADER_SIZE) else {
            return Err(CoreError::corrupt_record(
                0,
                format!("header needs {HEADER_SIZE} bytes, got {}", bytes.len()),
            ));
        };

        let env = read_u32(raw, 8);
        let id = ((env >> TRANSITION_SHIFT) & TRANSITION_MASK) as u8;
        let transition = TransitionId::from_byte(id)
            .ok_or_else(|| CoreError::corrupt_record(0, format!("unknown transition id {id}")))?;

        Ok(Self {
            timestamp: u64::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ]),
            transition,
            source_id: read_u32(raw, 12),
            damage: u16::from_le_bytes([raw[16], raw[17]]),
            type_id: u16::from_le_bytes([raw[18], raw[19]]),
            extent: read_u32(raw, 20),
        })
    }

    /// Returns the declared record size if a full header is present.
    ///
    /// Does not validate the transition id.
    #[must_use]
    pub fn peek_size(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(HEADER_SIZE + read_u32(bytes, 20) as usize)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Serializes a record: `header` with its extent set to `payload.len()`,
/// followed by the payload.
///
/// # Errors
///
/// Returns [`CoreError::CorruptRecord`] if the payload exceeds `u32::MAX`.
pub fn encode_record(header: &RecordHeader, payload: &[u8]) -> CoreResult<Vec<u8>> {
    let extent = u32::try_from(payload.len()).map_err(|_| {
        CoreError::corrupt_record(0, format!("payload of {} bytes too large", payload.len()))
    })?;
    let header = RecordHeader { extent, ..*header };
    let mut out = Vec::with_capacity(header.size());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    Ok(out)
}

/// A record borrowed from a channel view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Decoded header.
    pub header: RecordHeader,
    bytes: &'a [u8],
}

impl<'a> Record<'a> {
    /// Timestamp of the record.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// Full record bytes including the header.
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Payload bytes following the header.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// Copies the record out of the channel buffer.
    #[must_use]
    pub fn to_owned_record(&self) -> OwnedRecord {
        OwnedRecord {
            header: self.header,
            bytes: Bytes::copy_from_slice(self.bytes),
        }
    }
}

/// A record copied out of a channel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRecord {
    /// Decoded header.
    pub header: RecordHeader,
    bytes: Bytes,
}

impl OwnedRecord {
    /// Parses an owned record from exactly one record's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if the header is malformed or the
    /// length does not match the declared extent.
    pub fn from_bytes(bytes: Bytes) -> CoreResult<Self> {
        let header = RecordHeader::decode(&bytes)?;
        if header.size() != bytes.len() {
            return Err(CoreError::corrupt_record(
                0,
                format!("record declares {} bytes, got {}", header.size(), bytes.len()),
            ));
        }
        Ok(Self { header, bytes })
    }

    /// Timestamp of the record.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// Full record bytes including the header.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload bytes following the header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// Returns the underlying buffer.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Iterator over the records of a contiguous view.
///
/// Yields [`CoreError::CorruptRecord`] once and then stops if the view ends
/// in the middle of a record.
#[derive(Debug, Clone)]
pub struct RecordIter<'a> {
    view: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    /// Creates an iterator over `view`.
    #[must_use]
    pub const fn new(view: &'a [u8]) -> Self {
        Self {
            view,
            offset: 0,
            failed: false,
        }
    }

    /// Byte offset of the next record.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = CoreResult<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.view.len() {
            return None;
        }

        let rest = &self.view[self.offset..];
        let result = match RecordHeader::decode(rest) {
            Ok(header) if header.size() <= rest.len() => {
                let record = Record {
                    header,
                    bytes: &rest[..header.size()],
                };
                self.offset += header.size();
                return Some(Ok(record));
            }
            Ok(header) => CoreError::corrupt_record(
                self.offset,
                format!(
                    "record declares {} bytes, only {} remain",
                    header.size(),
                    rest.len()
                ),
            ),
            Err(CoreError::CorruptRecord { message, .. }) => {
                CoreError::corrupt_record(self.offset, message)
            }
            Err(other) => other,
        };
        self.failed = true;
        Some(Err(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = RecordHeader::new(0x0000_0010_0000_0020, TransitionId::L1Accept)
            .with_source(7)
            .with_type(3)
            .with_damage(1);
        let bytes = encode_record(&header, b"payload").unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 7);

        let decoded = RecordHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.timestamp, header.timestamp);
        assert_eq!(decoded.transition, TransitionId::L1Accept);
        assert_eq!(decoded.source_id, 7);
        assert_eq!(decoded.type_id, 3);
        assert_eq!(decoded.damage, 1);
        assert_eq!(decoded.extent, 7);
        assert_eq!(decoded.seconds(), 0x10);
        assert_eq!(decoded.nanoseconds(), 0x20);
    }

    #[test]
    fn transition_lives_in_env_bits() {
        let bytes = RecordHeader::new(1, TransitionId::BeginStep).encode();
        let env = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(env, 6 << 24);
    }

    #[test]
    fn unknown_transition_rejected() {
        let mut bytes = RecordHeader::new(1, TransitionId::Enable).encode();
        bytes[11] = 11;
        assert!(matches!(
            RecordHeader::decode(&bytes),
            Err(CoreError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn only_l1accept_is_event() {
        for b in 0..=12u8 {
            if let Some(id) = TransitionId::from_byte(b) {
                assert_eq!(id.is_event(), b == 12);
                assert_eq!(id.as_byte(), b);
            }
        }
        assert_eq!(TransitionId::from_byte(11), None);
    }

    #[test]
    fn iter_walks_records() {
        let mut view = encode_record(&RecordHeader::new(1, TransitionId::Configure), b"c").unwrap();
        view.extend(encode_record(&RecordHeader::new(5, TransitionId::L1Accept), b"").unwrap());
        view.extend(encode_record(&RecordHeader::new(9, TransitionId::L1Accept), b"xyz").unwrap());

        let records: Vec<_> = RecordIter::new(&view).collect::<CoreResult<_>>().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].payload(), b"c");
        assert_eq!(records[1].timestamp(), 5);
        assert_eq!(records[2].payload(), b"xyz");
    }

    #[test]
    fn iter_reports_truncation_once() {
        let mut view = encode_record(&RecordHeader::new(1, TransitionId::L1Accept), b"ok").unwrap();
        let second = encode_record(&RecordHeader::new(2, TransitionId::L1Accept), b"cut").unwrap();
        view.extend_from_slice(&second[..second.len() - 1]);

        let mut iter = RecordIter::new(&view);
        assert!(iter.next().unwrap().is_ok());
        match iter.next() {
            Some(Err(CoreError::CorruptRecord { offset, .. })) => {
                assert_eq!(offset, HEADER_SIZE + 2);
            }
            other => panic!("expected corrupt record, got {other:?}"),
        }
        assert!(iter.next().is_none());
    }

    #[test]
    fn owned_record_checks_length() {
        let bytes = encode_record(&RecordHeader::new(3, TransitionId::L1Accept), b"ab").unwrap();
        let owned = OwnedRecord::from_bytes(Bytes::from(bytes.clone())).unwrap();
        assert_eq!(owned.payload(), b"ab");
        assert_eq!(owned.timestamp(), 3);

        let short = Bytes::copy_from_slice(&bytes[..bytes.len() - 1]);
        assert!(OwnedRecord::from_bytes(short).is_err());
    }

    #[test]
    fn peek_size_needs_full_header() {
        let bytes = encode_record(&RecordHeader::new(3, TransitionId::L1Accept), &[0; 10]).unwrap();
        assert_eq!(RecordHeader::peek_size(&bytes), Some(HEADER_SIZE + 10));
        assert_eq!(RecordHeader::peek_size(&bytes[..HEADER_SIZE - 1]), None);
    }
}
