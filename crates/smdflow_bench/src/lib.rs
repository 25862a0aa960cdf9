//! Benchmark utilities.

#![warn(missing_docs)]

use smdflow_core::{encode_record, RecordHeader, TransitionId};

/// Deterministic payload of `size` bytes.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Encodes a channel of `events` event records with `payload_size` bytes
/// each, keeping every `stride`-th timestamp.
pub fn channel(events: u64, stride: u64, payload_size: usize) -> Vec<u8> {
    let body = payload(payload_size);
    let mut out = encode_record(&RecordHeader::new(0, TransitionId::Configure), b"cfg")
        .unwrap_or_default();
    for ts in (1..=events).filter(|ts| ts % stride == 0) {
        if let Ok(record) = encode_record(&RecordHeader::new(ts, TransitionId::L1Accept), &body) {
            out.extend_from_slice(&record);
        }
    }
    out
}

/// Encodes `n_channels` channels with strides 1, 2, 3, ...
pub fn channels(n_channels: usize, events: u64, payload_size: usize) -> Vec<Vec<u8>> {
    (0..n_channels)
        .map(|i| channel(events, i as u64 + 1, payload_size))
        .collect()
}
