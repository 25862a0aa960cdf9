//! # smdflow Storage
//!
//! Channel byte sources for smdflow.
//!
//! This crate provides the lowest-level input abstraction. Sources are
//! **opaque byte streams** - they do not interpret the records they carry.
//!
//! ## Design Principles
//!
//! - Sources are simple ordered byte streams (read, ended, position)
//! - No knowledge of record headers, events or steps
//! - Must be `Send` so a reader can live on a worker thread
//! - The reader owns all framing interpretation
//!
//! ## Available Sources
//!
//! - [`InMemorySource`] - For testing and in-process producers
//! - [`FileSource`] - For smd files on disk
//!
//! ## Example
//!
//! ```rust
//! use smdflow_storage::{ChannelSource, InMemorySource};
//!
//! let (mut source, writer) = InMemorySource::live();
//! writer.append(b"hello").unwrap();
//! let mut buf = [0u8; 16];
//! assert_eq!(source.read(&mut buf).unwrap(), 5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod source;

pub use error::{StorageError, StorageResult};
pub use file::FileSource;
pub use memory::{InMemorySource, InMemoryWriter};
pub use source::ChannelSource;
