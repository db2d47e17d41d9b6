//! ustar header block
//!
//! Layout (offsets in bytes):
//! - 0 name[100], 100 mode[8], 108 uid[8], 116 gid[8], 124 size[12]
//! - 136 mtime[12], 148 chksum[8], 156 typeflag, 157 linkname[100]
//! - 257 magic[6], 263 version[2], 265 uname[32], 297 gname[32]
//! - 329 devmajor[8], 337 devminor[8], 345 prefix[167]

use std::ops::Range;

/// Size of a header and of the data blocks that follow it
pub const BLOCK_SIZE: usize = 512;

/// Largest size that fits the 11-digit octal size field (8 GiB - 1)
pub const MAX_OCTAL_SIZE: u64 = (1 << 33) - 1;

/// Marker in the first byte of a numeric field holding base-256 binary
const BASE256_MARKER: u8 = 0x80;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const PREFIX: Range<usize> = 345..512;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Regular,
    Directory,
    Symlink,
}

impl EntryType {
    pub fn flag(self) -> u8 {
        match self {
            EntryType::Regular => b'0',
            EntryType::Directory => b'5',
            EntryType::Symlink => b'2',
        }
    }
}

/// A 512-byte tar header under construction
#[derive(Clone)]
pub struct TarHeader {
    block: [u8; BLOCK_SIZE],
}

impl TarHeader {
    /// Empty header of the given type with the ustar magic filled in
    pub fn new(entry_type: EntryType) -> Self {
        let mut block = [0u8; BLOCK_SIZE];
        block[CHKSUM].fill(b' ');
        block[TYPEFLAG] = entry_type.flag();
        block[MAGIC].copy_from_slice(USTAR_MAGIC);
        block[VERSION].copy_from_slice(USTAR_VERSION);
        Self { block }
    }

    /// Entry name, truncated to 100 bytes
    pub fn set_name(&mut self, name: &str) {
        copy_truncated(&mut self.block[NAME], name.as_bytes());
    }

    /// Directory prefix, truncated to 167 bytes
    pub fn set_prefix(&mut self, prefix: &str) {
        copy_truncated(&mut self.block[PREFIX], prefix.as_bytes());
    }

    /// Symlink target, truncated to 100 bytes
    pub fn set_linkname(&mut self, target: &str) {
        copy_truncated(&mut self.block[LINKNAME], target.as_bytes());
    }

    pub fn set_mode(&mut self, mode: u32) {
        write_numeric(&mut self.block[MODE], mode as u64);
    }

    pub fn set_uid(&mut self, uid: u32) {
        write_numeric(&mut self.block[UID], uid as u64);
    }

    pub fn set_gid(&mut self, gid: u32) {
        write_numeric(&mut self.block[GID], gid as u64);
    }

    pub fn set_mtime(&mut self, mtime: u32) {
        write_numeric(&mut self.block[MTIME], mtime as u64);
    }

    /// Sizes beyond [`MAX_OCTAL_SIZE`] use the GNU base-256 encoding
    pub fn set_size(&mut self, size: u64) {
        write_numeric(&mut self.block[SIZE], size);
    }

    pub fn size(&self) -> Option<u64> {
        read_numeric(&self.block[SIZE])
    }

    pub fn entry_type(&self) -> u8 {
        self.block[TYPEFLAG]
    }

    /// Unsigned byte sum of the header with the checksum field counted as
    /// spaces
    pub fn compute_checksum(&self) -> u32 {
        checksum(&self.block)
    }

    /// Checksum currently stored in the header, if it parses
    pub fn stored_checksum(&self) -> Option<u32> {
        read_numeric(&self.block[CHKSUM]).map(|v| v as u32)
    }

    /// Fill in the checksum field. Call after every other field is set.
    pub fn finalize(&mut self) {
        self.block[CHKSUM].fill(b' ');
        let sum = self.compute_checksum();
        write_octal(&mut self.block[CHKSUM], sum as u64);
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.block
    }

    pub fn from_bytes(block: [u8; BLOCK_SIZE]) -> Self {
        Self { block }
    }
}

impl std::fmt::Debug for TarHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarHeader")
            .field("name", &String::from_utf8_lossy(until_nul(&self.block[NAME])))
            .field("prefix", &String::from_utf8_lossy(until_nul(&self.block[PREFIX])))
            .field("typeflag", &(self.block[TYPEFLAG] as char))
            .field("size", &self.size())
            .finish()
    }
}

/// Header checksum of a raw 512-byte block
pub fn checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHKSUM.contains(&i) { b' ' as u32 } else { b as u32 })
        .sum()
}

/// Number of zero bytes needed to pad `len` to a block boundary
pub fn padding_for(len: u64) -> usize {
    let rem = (len % BLOCK_SIZE as u64) as usize;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem
    }
}

fn copy_truncated(field: &mut [u8], value: &[u8]) {
    field.fill(0);
    let len = value.len().min(field.len());
    field[..len].copy_from_slice(&value[..len]);
}

fn until_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Zero-padded octal filling all but the last byte, which is NUL
fn write_octal(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let text = format!("{:0width$o}", value, width = digits);
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
}

/// Octal when the value fits the field, GNU base-256 otherwise
fn write_numeric(field: &mut [u8], value: u64) {
    let digits = (field.len() - 1) as u32;
    let max_octal = (1u64 << (3 * digits)) - 1;

    if value <= max_octal {
        write_octal(field, value);
    } else {
        field.fill(0);
        field[0] = BASE256_MARKER;
        let bytes = value.to_be_bytes();
        let tail = field.len() - 1;
        let take = tail.min(bytes.len());
        let start = field.len() - take;
        field[start..].copy_from_slice(&bytes[bytes.len() - take..]);
    }
}

fn read_numeric(field: &[u8]) -> Option<u64> {
    if field[0] & BASE256_MARKER != 0 {
        return Some(field[1..].iter().fold(0u64, |acc, &b| (acc << 8) | b as u64));
    }
    let text = std::str::from_utf8(until_nul(field)).ok()?;
    let text = text.trim_matches(' ');
    if text.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(text, 8).ok()
}
