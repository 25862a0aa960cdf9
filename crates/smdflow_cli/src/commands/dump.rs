//! Dump command implementation.

use super::{open_manager, OutputFormat};
use serde::Serialize;
use smdflow_core::{Event, SmdReaderManager};
use std::path::PathBuf;

/// Event representation for output.
#[derive(Debug, Serialize)]
pub struct EventInfo {
    /// Event timestamp.
    pub timestamp: u64,
    /// Seconds part of the timestamp.
    pub seconds: u32,
    /// Nanoseconds part of the timestamp.
    pub nanoseconds: u32,
    /// Payload size per channel, `None` where the channel has no record.
    pub payload_sizes: Vec<Option<usize>>,
}

impl EventInfo {
    fn from_event(event: &Event<'_>) -> Self {
        Self {
            timestamp: event.timestamp,
            seconds: (event.timestamp >> 32) as u32,
            nanoseconds: (event.timestamp & 0xFFFF_FFFF) as u32,
            payload_sizes: event
                .records
                .iter()
                .map(|r| r.as_ref().map(|r| r.payload().len()))
                .collect(),
        }
    }
}

/// Runs the dump command.
pub fn run(
    files: &[PathBuf],
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = open_manager(files)?;
    let events = read_events(&mut manager, limit)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        OutputFormat::Text => {
            print_text_output(&events);
        }
    }

    Ok(())
}

/// Collects up to `limit` events from `manager`.
pub fn read_events(
    manager: &mut SmdReaderManager,
    limit: Option<usize>,
) -> Result<Vec<EventInfo>, Box<dyn std::error::Error>> {
    let max_events = limit.unwrap_or(usize::MAX);
    let mut events = Vec::new();

    manager.get_next_dgrams()?;
    'windows: while let Some(batches) = manager.next_batch_iter()? {
        for batch in batches {
            for event in &batch.events {
                if events.len() >= max_events {
                    break 'windows;
                }
                events.push(EventInfo::from_event(event));
            }
        }
    }

    Ok(events)
}

fn print_text_output(events: &[EventInfo]) {
    println!("Events ({} total)", events.len());
    println!("================");
    println!();

    for event in events {
        print!("[{:>10}.{:09}]", event.seconds, event.nanoseconds);
        for (i, size) in event.payload_sizes.iter().enumerate() {
            match size {
                Some(size) => print!(" ch{:02}={}", i, size),
                None => print!(" ch{:02}=-", i),
            }
        }
        println!();
    }
}
