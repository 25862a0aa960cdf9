//! Inspect command implementation.

use super::{format_size, open_manager, OutputFormat};
use serde::Serialize;
use smdflow_core::SmdReaderManager;
use std::path::PathBuf;

/// Channel inspection result.
#[derive(Debug, Default, Serialize)]
pub struct InspectResult {
    /// Channel files, in channel order.
    pub files: Vec<String>,
    /// Number of channels.
    pub channels: usize,
    /// Number of configure records found.
    pub configs: usize,
    /// Number of events built.
    pub events: u64,
    /// Number of step records.
    pub steps: usize,
    /// Events with a record from every channel.
    pub complete_events: u64,
    /// Number of windows released.
    pub windows: usize,
    /// Smallest timestamp seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ts: Option<u64>,
    /// Largest timestamp seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ts: Option<u64>,
    /// Bytes read from all channels.
    pub bytes_read: u64,
}

/// Runs the inspect command.
pub fn run(files: &[PathBuf], format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = open_manager(files)?;
    let mut result = inspect(&mut manager)?;
    result.files = files.iter().map(|p| p.display().to_string()).collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Reads every window of `manager` and tallies events and steps.
pub fn inspect(manager: &mut SmdReaderManager) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut result = InspectResult {
        channels: manager.n_channels(),
        configs: manager.get_next_dgrams()?.map_or(0, |c| c.len()),
        ..InspectResult::default()
    };

    while let Some(batches) = manager.next_batch_iter()? {
        result.windows += 1;
        for batch in batches {
            result.steps += batch.nsteps();
            result.complete_events += batch.events.iter().filter(|e| e.is_complete()).count() as u64;
        }
    }

    result.events = manager.processed_events();
    result.min_ts = manager.min_ts();
    result.max_ts = manager.max_ts();
    result.bytes_read = manager.bytes_read();
    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("smdflow Channel Inspection");
    println!("==========================");
    println!();
    println!("Channels: {}", result.channels);
    for (i, file) in result.files.iter().enumerate() {
        println!("  [{:02}] {}", i, file);
    }
    println!();
    println!("Records:");
    println!("  Configs:         {}", result.configs);
    println!("  Events:          {}", result.events);
    println!("  Complete events: {}", result.complete_events);
    println!("  Steps:           {}", result.steps);
    println!("  Windows:         {}", result.windows);
    println!();
    println!("Timestamps:");
    match (result.min_ts, result.max_ts) {
        (Some(min), Some(max)) => {
            println!("  First: {}", min);
            println!("  Last:  {}", max);
        }
        _ => println!("  (none)"),
    }
    println!();
    println!("Read: {} bytes", format_size(result.bytes_read));
}

#[cfg(test)]
mod tests {
    use super::*;
    use smdflow_core::{PipelineConfig, TransitionId};
    use smdflow_testkit::{sources, ChannelBuilder};

    #[test]
    fn tallies_events_and_steps() {
        let channels = vec![
            ChannelBuilder::new()
                .configure()
                .events(&[1, 2])
                .step(3, TransitionId::Enable)
                .events(&[4]),
            ChannelBuilder::new().configure().events(&[1, 4]),
        ];
        let mut manager = SmdReaderManager::new(sources(channels), PipelineConfig::new()).unwrap();

        let result = inspect(&mut manager).unwrap();
        assert_eq!(result.channels, 2);
        assert_eq!(result.configs, 2);
        assert_eq!(result.events, 3);
        assert_eq!(result.complete_events, 2);
        assert_eq!(result.steps, 1);
        assert_eq!(result.min_ts, Some(1));
        assert_eq!(result.max_ts, Some(4));
    }
}
