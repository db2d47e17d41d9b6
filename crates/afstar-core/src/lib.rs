use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub mod directory;
pub mod dump;
pub mod error;
pub mod pipeline;
pub mod resolve;
pub mod tar;

pub use dump::{inspect, DumpHeader, DumpInventory, VNode, VNodeType, VolumeHeader, VolumeInventory};
pub use error::ConvertError;
pub use pipeline::{ConvertProgress, ConvertStage, Converter};

/// Conversion options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// 0 is quiet, 1 logs every archived path, 2 adds per volume and per file
    /// byte counts
    pub verbose: u8,
    /// Add an ACL restore script to every directory
    pub acl_scripts: bool,
    /// Accept the 64-bit vnode size tag
    pub large_files: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            acl_scripts: false,
            large_files: true,
        }
    }
}

/// What a conversion did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionSummary {
    /// Volume name from the dump header
    pub volume_name: String,
    pub volumes: u32,
    pub vnodes: u64,
    /// Tar entries written, ACL scripts included
    pub entries_written: u64,
    pub acl_scripts_written: u64,
    /// Vnodes parked during the main pass
    pub orphans_deferred: u64,
    pub orphans_resolved: u64,
    pub orphan_passes: u32,
    /// Ids of vnodes that were never placed and are missing from the archive
    pub orphans_dropped: Vec<u32>,
    pub bytes_read: u64,
    /// Total archive size, end marker included
    pub bytes_written: u64,
    pub short_reads: u64,
}

/// Convert a dump stream into a tar stream
pub fn convert<R: Read, W: Write>(
    input: R,
    output: W,
    config: ConvertConfig,
) -> std::result::Result<ConversionSummary, ConvertError> {
    Converter::new(output, config).convert(input)
}

/// Convert the dump at `dump_path` into a tar file at `tar_path`
pub fn convert_file(
    dump_path: &Path,
    tar_path: &Path,
    config: ConvertConfig,
) -> Result<ConversionSummary> {
    tracing::info!(
        "Converting {} to {}",
        dump_path.display(),
        tar_path.display()
    );

    let input = File::open(dump_path)
        .with_context(|| format!("Failed to open dump {}", dump_path.display()))?;
    let output = File::create(tar_path)
        .with_context(|| format!("Failed to create archive {}", tar_path.display()))?;

    let summary = convert(BufReader::new(input), BufWriter::new(output), config)
        .with_context(|| format!("Failed to convert {}", dump_path.display()))?;

    tracing::info!(
        "Wrote {} entries ({} bytes) to {}",
        summary.entries_written,
        summary.bytes_written,
        tar_path.display()
    );
    Ok(summary)
}

/// Read the dump at `dump_path` without converting it
pub fn inspect_file(dump_path: &Path, large_files: bool) -> Result<DumpInventory> {
    let input = File::open(dump_path)
        .with_context(|| format!("Failed to open dump {}", dump_path.display()))?;
    let inventory = inspect(BufReader::new(input), large_files)
        .with_context(|| format!("Failed to read {}", dump_path.display()))?;
    Ok(inventory)
}
