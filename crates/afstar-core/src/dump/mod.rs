//! AFS volume dump decoding
//!
//! A dump is a flat sequence of records with no outer framing. Each record is
//! introduced by a one-byte record type and continues as a run of
//! single-character field tags. A record ends when a tag arrives that is not
//! part of its tag set; that tag is handed back to the caller, which reads it
//! as the type of the next record.

use std::io::Read;

pub mod header;
pub mod inventory;
pub mod reader;
pub mod vnode;

pub use header::{unix_time, DumpHeader, DumpTimeRange, VolumeHeader};
pub use inventory::{inspect, DumpInventory, VolumeInventory};
pub use reader::TagReader;
pub use vnode::{Acl, AclEntry, VNode, VNodeType};

/// Magic number following the dump header record type
pub const DUMP_BEGIN_MAGIC: u32 = 0xB3A1_1322;

/// Magic number following the end-of-dump record type
pub const DUMP_END_MAGIC: u32 = 0x3A21_4B6E;

/// The only dump format version we understand
pub const DUMP_VERSION: i32 = 1;

/// Vnode id of a volume's root directory
pub const ROOT_VNODE: u32 = 1;

/// Top-level record types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    DumpHeader = 1,
    VolumeHeader = 2,
    VNode = 3,
    DumpEnd = 4,
}

impl RecordKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordKind::DumpHeader),
            2 => Some(RecordKind::VolumeHeader),
            3 => Some(RecordKind::VNode),
            4 => Some(RecordKind::DumpEnd),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::DumpHeader => write!(f, "dump header"),
            RecordKind::VolumeHeader => write!(f, "volume header"),
            RecordKind::VNode => write!(f, "vnode"),
            RecordKind::DumpEnd => write!(f, "end of dump"),
        }
    }
}

/// Outcome of feeding one tag to a record decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStep {
    /// The field was consumed; keep reading tags for this record
    Continue,
    /// A size field was read and the payload follows immediately
    Payload,
    /// The tag is not ours: the record is finished and the tag belongs to
    /// whatever comes next
    Done(u8),
}

/// A record decoded from a run of tagged fields
pub trait TaggedRecord {
    const KIND: RecordKind;

    /// Consume the field introduced by `tag`
    fn apply_tag<R: Read>(&mut self, tag: u8, reader: &mut TagReader<R>) -> TagStep;
}

/// Feed tags to `record` until one is not part of its tag set and return
/// that tag.
///
/// Records with payloads are driven by the pipeline instead, since the payload
/// has to be handled before the next tag is read.
pub fn read_fields<R: Read, T: TaggedRecord>(record: &mut T, reader: &mut TagReader<R>) -> u8 {
    loop {
        let tag = reader.read_char();
        match record.apply_tag(tag, reader) {
            TagStep::Continue => {}
            TagStep::Payload => {
                tracing::debug!("{} record reported a payload, ignoring", T::KIND);
            }
            TagStep::Done(tag) => return tag,
        }
    }
}

