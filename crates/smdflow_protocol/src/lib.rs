//! # smdflow Protocol
//!
//! Message types exchanged between workers and the collector, and their
//! CBOR frame encoding.
//!
//! This crate provides:
//! - [`Message`], a closed set of [`Datagram`], [`Transition`] and [`Occurrence`]
//! - [`DataType`] and [`Value`] for datagram payloads
//! - [`Partition`] declarations carried by `Allocate` transitions
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;
mod value;

pub use messages::{
    Datagram, Message, Occurrence, OccurrenceKind, Partition, Transition, TransitionKind,
    TransitionPayload,
};
pub use value::{DataType, Value};

pub use smdflow_codec::{CodecError, CodecResult};
