//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod run;

use clap::ValueEnum;
use smdflow_core::{PipelineConfig, SmdReaderManager};
use smdflow_storage::{ChannelSource, FileSource};
use std::path::PathBuf;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// One JSON document (or one per line for streams).
    Json,
}

/// Opens `files` as ended channels under the environment configuration.
pub fn open_manager(files: &[PathBuf]) -> Result<SmdReaderManager, Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env()?;
    let sources = files
        .iter()
        .map(|path| -> Result<Box<dyn ChannelSource>, Box<dyn std::error::Error>> {
            if !path.exists() {
                return Err(format!("No smd file found at {:?}", path).into());
            }
            Ok(Box::new(FileSource::open(path)?))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SmdReaderManager::new(sources, config)?)
}

pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names() {
        assert_eq!(OutputFormat::from_str("json", false), Ok(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("text", false), Ok(OutputFormat::Text));
        assert!(OutputFormat::from_str("yaml", false).is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = open_manager(&[PathBuf::from("/nonexistent/chan00.smd")]).unwrap_err();
        assert!(err.to_string().contains("No smd file"));
    }
}
