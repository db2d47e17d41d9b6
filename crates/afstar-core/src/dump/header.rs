//! Dump header and volume header records

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;

use super::{read_fields, RecordKind, TagReader, TagStep, TaggedRecord};
use super::{DUMP_BEGIN_MAGIC, DUMP_VERSION};
use crate::error::{ConvertError, Result};

/// Maximum number of weekly use counters kept from a volume header
pub const MAX_WEEK_USE: usize = 100;

/// Time range covered by one dump level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpTimeRange {
    pub from: u32,
    pub to: u32,
}

impl DumpTimeRange {
    pub fn from_time(&self) -> Option<DateTime<Utc>> {
        unix_time(self.from)
    }

    pub fn to_time(&self) -> Option<DateTime<Utc>> {
        unix_time(self.to)
    }
}

/// Dump timestamps are unsigned seconds since the epoch; zero means unset
pub fn unix_time(secs: u32) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    Utc.timestamp_opt(secs as i64, 0).single()
}

/// Header at the start of every dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpHeader {
    pub version: i32,
    pub volume_id: u32,
    pub volume_name: String,
    pub dump_times: Vec<DumpTimeRange>,
}

impl DumpHeader {
    /// Read the magic, version and tagged fields that follow the dump header
    /// record type.
    ///
    /// Returns the header and the tag that ended it. A bad magic number or an
    /// unsupported version is fatal.
    pub fn read<R: Read>(reader: &mut TagReader<R>) -> Result<(Self, u8)> {
        let magic = reader.read_u32();
        if magic != DUMP_BEGIN_MAGIC {
            return Err(ConvertError::BadMagic { found: magic });
        }

        let version = reader.read_scalar(4);
        if version != DUMP_VERSION {
            return Err(ConvertError::UnsupportedVersion(version));
        }

        let mut header = DumpHeader {
            version,
            ..Default::default()
        };
        let tag = read_fields(&mut header, reader);
        Ok((header, tag))
    }
}

impl TaggedRecord for DumpHeader {
    const KIND: RecordKind = RecordKind::DumpHeader;

    fn apply_tag<R: Read>(&mut self, tag: u8, reader: &mut TagReader<R>) -> TagStep {
        match tag {
            b'v' => self.volume_id = reader.read_u32(),
            b'n' => self.volume_name = reader.read_string(),
            b't' => {
                // The count is of 32-bit words, two per range
                let count = (reader.read_scalar(2) >> 1).max(0);
                self.dump_times = (0..count)
                    .map(|_| DumpTimeRange {
                        from: reader.read_u32(),
                        to: reader.read_u32(),
                    })
                    .collect();
            }
            other => return TagStep::Done(other),
        }
        TagStep::Continue
    }
}

/// Per-volume header preceding that volume's vnodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeHeader {
    pub volume_id: u32,
    pub volume_name: String,
    pub vol_type: u8,
    pub uniquifier: u32,
    pub parent_volume: u32,
    pub clone_id: u32,
    pub max_quota: u32,
    pub min_quota: u32,
    pub disk_used: u32,
    pub file_count: u32,
    pub account_number: u32,
    pub owner: u32,
    pub creation_date: u32,
    pub access_date: u32,
    pub update_date: u32,
    pub expiration_date: u32,
    pub backup_date: u32,
    pub day_use_date: u32,
    pub day_use: u32,
    pub week_use: Vec<u32>,
    pub motd: String,
    pub offline_message: String,
    pub in_service: bool,
    pub blessed: bool,
}

impl VolumeHeader {
    /// Read the tagged fields of a volume header; returns the tag that ended it
    pub fn read<R: Read>(reader: &mut TagReader<R>) -> (Self, u8) {
        let mut header = VolumeHeader::default();
        let tag = read_fields(&mut header, reader);
        (header, tag)
    }
}

impl TaggedRecord for VolumeHeader {
    const KIND: RecordKind = RecordKind::VolumeHeader;

    fn apply_tag<R: Read>(&mut self, tag: u8, reader: &mut TagReader<R>) -> TagStep {
        match tag {
            b'i' => self.volume_id = reader.read_u32(),
            b'v' => {
                // version stamp, not needed for tar output
                reader.read_u32();
            }
            b'n' => self.volume_name = reader.read_string(),
            b's' => self.in_service = reader.read_scalar(1) != 0,
            b'b' => self.blessed = reader.read_scalar(1) != 0,
            b'u' => self.uniquifier = reader.read_u32(),
            b't' => self.vol_type = reader.read_scalar(1) as u8,
            b'p' => self.parent_volume = reader.read_u32(),
            b'c' => self.clone_id = reader.read_u32(),
            b'q' => self.max_quota = reader.read_u32(),
            b'm' => self.min_quota = reader.read_u32(),
            b'd' => self.disk_used = reader.read_u32(),
            b'f' => self.file_count = reader.read_u32(),
            b'a' => self.account_number = reader.read_u32(),
            b'o' => self.owner = reader.read_u32(),
            b'C' => self.creation_date = reader.read_u32(),
            b'A' => self.access_date = reader.read_u32(),
            b'U' => self.update_date = reader.read_u32(),
            b'E' => self.expiration_date = reader.read_u32(),
            b'B' => self.backup_date = reader.read_u32(),
            b'D' => self.day_use_date = reader.read_u32(),
            b'Z' => self.day_use = reader.read_u32(),
            b'O' => self.offline_message = reader.read_string(),
            b'M' => self.motd = reader.read_string(),
            b'W' => {
                let count = reader.read_scalar(2).max(0) as usize;
                if count > MAX_WEEK_USE {
                    tracing::warn!(
                        "volume header has {} week use counters, keeping {}",
                        count,
                        MAX_WEEK_USE
                    );
                }
                // All counters are consumed to stay in step with the stream
                self.week_use = (0..count).map(|_| reader.read_u32()).collect();
                self.week_use.truncate(MAX_WEEK_USE);
            }
            other => return TagStep::Done(other),
        }
        TagStep::Continue
    }
}
