//! Property-based test generators using proptest.
//!
//! Provides strategies for channel timestamps, payloads and footer
//! segments.

use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for a strictly increasing list of event timestamps.
///
/// Timestamps start at 1, leaving 0 for configure records.
pub fn timestamps_strategy(max_len: usize, max_ts: u64) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::btree_set(1..=max_ts, 0..=max_len)
        .prop_map(|set: BTreeSet<u64>| set.into_iter().collect())
}

/// Strategy for `n_channels` channels drawn from a shared timestamp range.
///
/// A small range makes overlap between channels likely.
pub fn channels_strategy(
    n_channels: usize,
    max_len: usize,
    max_ts: u64,
) -> impl Strategy<Value = Vec<Vec<u64>>> {
    prop::collection::vec(timestamps_strategy(max_len, max_ts), n_channels)
}

/// Strategy for record payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for footer segments, including empty ones.
pub fn segments_strategy(max_segments: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(
        prop_oneof![
            Just(Vec::new()),
            prop::collection::vec(any::<u8>(), 1..512),
        ],
        0..=max_segments,
    )
}

/// Strategy for entry names.
pub fn entry_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn timestamps_are_increasing(ts in timestamps_strategy(32, 100)) {
            prop_assert!(ts.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(ts.iter().all(|t| *t >= 1));
        }

        #[test]
        fn channel_count_is_fixed(channels in channels_strategy(3, 8, 20)) {
            prop_assert_eq!(channels.len(), 3);
        }
    }
}
