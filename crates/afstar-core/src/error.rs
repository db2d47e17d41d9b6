//! Fatal conversion errors
//!
//! Only header corruption and broken record framing stop a conversion.
//! Short reads, truncated payloads and orphaned vnodes are reported through
//! `tracing` where they are detected and never surface here.

use thiserror::Error;

use crate::dump::RecordKind;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("expected dump header, found record type {0}")]
    NotADump(i32),

    #[error("input does not appear to be a vos dump (magic 0x{found:08X})")]
    BadMagic { found: u32 },

    #[error("vos dump has unsupported version: {0}")]
    UnsupportedVersion(i32),

    #[error("expected {expected}, found {}", describe_tag(.found))]
    UnexpectedRecord { expected: &'static str, found: u8 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Name a record type byte, or show it raw if it is not one
fn describe_tag(tag: &u8) -> String {
    match RecordKind::from_tag(*tag) {
        Some(kind) => format!("{} record", kind),
        None if tag.is_ascii_graphic() => format!("unknown tag '{}'", *tag as char),
        None => format!("unknown tag 0x{:02X}", tag),
    }
}
