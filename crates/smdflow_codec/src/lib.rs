//! # smdflow Codec
//!
//! Wire framing for smdflow.
//!
//! This crate provides:
//! - [`PacketFooter`] framing that multiplexes one sub-buffer per channel
//!   into a single transport buffer and splits it back out without copying
//! - CBOR helpers used to serialize control-plane messages
//!
//! ## Usage
//!
//! ```
//! use smdflow_codec::{decode, encode};
//!
//! let framed = encode(&[b"chan0".to_vec(), b"chan1!".to_vec()]).unwrap();
//! let parts = decode(&framed, 2).unwrap();
//! assert_eq!(parts[1], b"chan1!");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod footer;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use footer::{decode, decode_bytes, encode, PacketFooter, SIZE_WIDTH};
