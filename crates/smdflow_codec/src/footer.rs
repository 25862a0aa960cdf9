//! PacketFooter framing.
//!
//! A framed buffer is N segments laid end to end, followed by N
//! little-endian `u32` sizes in segment order:
//!
//! ```text
//! +-----------+-----------+-----+---------+---------+-----+
//! | segment 0 | segment 1 | ... | size[0] | size[1] | ... |
//! +-----------+-----------+-----+---------+---------+-----+
//! ```
//!
//! The segment count is not stored; both sides agree on it out of band
//! (it is the channel count).

use crate::error::{CodecError, CodecResult};
use bytes::Bytes;

/// Width in bytes of one size entry in the footer.
pub const SIZE_WIDTH: usize = 4;

/// Size table appended after a set of concatenated segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFooter {
    sizes: Vec<u32>,
}

impl PacketFooter {
    /// Creates a footer for `n_packets` segments, all sized zero.
    #[must_use]
    pub fn new(n_packets: usize) -> Self {
        Self {
            sizes: vec![0; n_packets],
        }
    }

    /// Reads the footer from the tail of `buf` and checks it accounts for
    /// every byte of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if `buf` cannot hold the footer and
    /// [`CodecError::LengthMismatch`] if the sizes do not add up.
    pub fn from_buffer(buf: &[u8], n_packets: usize) -> CodecResult<Self> {
        let footer_len = n_packets * SIZE_WIDTH;
        if buf.len() < footer_len {
            return Err(CodecError::Truncated {
                len: buf.len(),
                n_packets,
            });
        }

        let table = &buf[buf.len() - footer_len..];
        let sizes: Vec<u32> = table
            .chunks_exact(SIZE_WIDTH)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let footer = Self { sizes };
        let expected = footer.payload_len() + footer_len as u64;
        if expected != buf.len() as u64 {
            return Err(CodecError::LengthMismatch {
                expected,
                actual: buf.len() as u64,
            });
        }

        Ok(footer)
    }

    /// Number of segments described.
    #[must_use]
    pub fn n_packets(&self) -> usize {
        self.sizes.len()
    }

    /// Records the size of segment `index`.
    ///
    /// # Errors
    ///
    /// Fails if `index` is out of range or `size` does not fit in 32 bits.
    pub fn set_size(&mut self, index: usize, size: usize) -> CodecResult<()> {
        let n_packets = self.sizes.len();
        let slot = self
            .sizes
            .get_mut(index)
            .ok_or(CodecError::IndexOutOfRange { index, n_packets })?;
        *slot = u32::try_from(size).map_err(|_| CodecError::SegmentTooLarge { index, len: size })?;
        Ok(())
    }

    /// Size of segment `index`.
    #[must_use]
    pub fn size(&self, index: usize) -> Option<usize> {
        self.sizes.get(index).map(|&s| s as usize)
    }

    /// Iterates over the segment sizes in order.
    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.sizes.iter().map(|&s| s as usize)
    }

    /// Sum of all segment sizes.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        self.sizes.iter().map(|&s| u64::from(s)).sum()
    }

    /// Length of the encoded footer.
    #[must_use]
    pub fn footer_len(&self) -> usize {
        self.sizes.len() * SIZE_WIDTH
    }

    /// Encoded footer bytes.
    #[must_use]
    pub fn footer(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.footer_len());
        for size in &self.sizes {
            out.extend_from_slice(&size.to_le_bytes());
        }
        out
    }

    /// Byte ranges of each segment within a framed buffer.
    fn ranges(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        let mut start = 0usize;
        self.sizes.iter().map(move |&s| {
            let end = start + s as usize;
            let range = start..end;
            start = end;
            range
        })
    }
}

/// Concatenates `segments` and appends their sizes.
///
/// # Errors
///
/// Returns [`CodecError::SegmentTooLarge`] if a segment exceeds `u32::MAX`
/// bytes.
pub fn encode<S: AsRef<[u8]>>(segments: &[S]) -> CodecResult<Vec<u8>> {
    let mut footer = PacketFooter::new(segments.len());
    let total: usize = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total + footer.footer_len());

    for (i, segment) in segments.iter().enumerate() {
        let segment = segment.as_ref();
        footer.set_size(i, segment.len())?;
        out.extend_from_slice(segment);
    }
    out.extend_from_slice(&footer.footer());

    Ok(out)
}

/// Splits a framed buffer back into `n_packets` borrowed segments.
///
/// # Errors
///
/// Fails with a format error if the footer does not describe `buf` exactly.
pub fn decode(buf: &[u8], n_packets: usize) -> CodecResult<Vec<&[u8]>> {
    let footer = PacketFooter::from_buffer(buf, n_packets)?;
    Ok(footer.ranges().map(|r| &buf[r]).collect())
}

/// Like [`decode`], but returns reference-counted slices of `buf`.
///
/// # Errors
///
/// Fails with a format error if the footer does not describe `buf` exactly.
pub fn decode_bytes(buf: &Bytes, n_packets: usize) -> CodecResult<Vec<Bytes>> {
    let footer = PacketFooter::from_buffer(buf, n_packets)?;
    Ok(footer.ranges().map(|r| buf.slice(r)).collect())
}
