//! # smdflow Core
//!
//! Reads small-data records from N parallel channels and rebuilds complete
//! events by matching records across channels on their timestamp.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               SmdReaderManager               │
//! │   get_next_dgrams / next_batch_iter / chunks │
//! ├──────────────────────────────────────────────┤
//! │  EventBuilder   │   ChunkedChannelReader     │
//! │  (join, batch)  │   (arenas, windows)        │
//! ├──────────────────────────────────────────────┤
//! │          ChannelSource (smdflow_storage)     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Buffers
//!
//! Released windows borrow the reader's arenas. A [`BatchIterator`] and the
//! [`Batch`]es it yields keep the manager borrowed, so no read can happen
//! while they are alive. Anything that must outlive a window is copied:
//! [`OwnedRecord`], [`OwnedEvent`] or an [`SmdChunk`].
//!
//! ## Example
//!
//! ```rust
//! use smdflow_core::{encode_record, PipelineConfig, RecordHeader, SmdReaderManager, TransitionId};
//! use smdflow_storage::{ChannelSource, InMemorySource};
//!
//! let mut data = Vec::new();
//! for ts in [1u64, 2, 3] {
//!     data.extend(encode_record(&RecordHeader::new(ts, TransitionId::L1Accept), b"x").unwrap());
//! }
//! let sources: Vec<Box<dyn ChannelSource>> = vec![Box::new(InMemorySource::with_data(data))];
//! let config = PipelineConfig::new().chunk_size(4096);
//! let mut manager = SmdReaderManager::new(sources, config).unwrap();
//!
//! let mut total = 0;
//! while let Some(batches) = manager.next_batch_iter().unwrap() {
//!     for batch in batches {
//!         total += batch.nevents();
//!     }
//! }
//! assert_eq!(total, 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod error;
mod manager;
mod reader;
mod record;

pub use builder::{
    check_channel_count, Batch, BuildOptions, DestinationFn, Event, EventBuilder, FilterFn,
    OwnedEvent,
};
pub use config::{
    PipelineConfig, ENV_CHUNK_SIZE, ENV_MAX_EVENTS, ENV_MAX_RETRIES, ENV_N_EVENTS,
};
pub use error::{CoreError, CoreResult};
pub use manager::{BatchIterator, Chunks, ReaderState, SmdChunk, SmdReaderManager};
pub use reader::{ChunkedChannelReader, Window};
pub use record::{
    encode_record, OwnedRecord, Record, RecordHeader, RecordIter, TransitionId, HEADER_SIZE,
};
