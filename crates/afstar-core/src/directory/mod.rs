//! AFS directory page decoding
//!
//! A directory vnode's payload is its on-disk hashed directory. The blob is an
//! array of 32-byte slots; page 0 starts with a header that fills the first 13
//! slots:
//! - Page header (32 bytes): page count, tag, free count, free bitmap
//! - Allocation map (128 bytes)
//! - Hash table (128 big-endian u16 entry numbers)
//!
//! Each entry slot holds `flag, length, next, (vnode, unique), name[20]`.
//! Names longer than 19 bytes continue into the following slots. Entry numbers
//! count slots from the start of the blob, so entry `n` lives at byte `32 * n`;
//! the hash table and `next` links use 0 as the end of a chain.

use byteorder::{BigEndian, ByteOrder};

/// Size of one directory slot
pub const ENTRY_SIZE: usize = 32;

/// Number of hash buckets in the directory header
pub const HASH_SIZE: usize = 128;

/// Slots occupied by the page 0 header
pub const HEADER_SLOTS: usize = 13;

const HASH_TABLE_OFFSET: usize = 32 + 128;
const NEXT_OFFSET: usize = 2;
const VNODE_OFFSET: usize = 4;
const UNIQUE_OFFSET: usize = 8;
const NAME_OFFSET: usize = 12;

/// Longest name scanned for a NUL, extension slots included
pub const MAX_NAME_LEN: usize = 256;

/// One child found in a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub vnode: u32,
    pub unique: u32,
    pub name: String,
}

impl DirectoryEntry {
    /// Directory vnodes always have odd ids, files and symlinks even ones
    pub fn is_directory(&self) -> bool {
        self.vnode & 1 == 1
    }
}

/// Read-only view over a directory blob
pub struct DirectoryPage<'a> {
    data: &'a [u8],
}

impl<'a> DirectoryPage<'a> {
    /// Wrap a directory blob. Returns `None` if it cannot hold the header.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < HEADER_SLOTS * ENTRY_SIZE {
            return None;
        }
        Some(Self { data })
    }

    /// Number of slots in the blob, header included
    pub fn slot_count(&self) -> usize {
        self.data.len() / ENTRY_SIZE
    }

    /// First entry number of a hash bucket
    pub fn bucket_head(&self, bucket: usize) -> u16 {
        let offset = HASH_TABLE_OFFSET + bucket * 2;
        BigEndian::read_u16(&self.data[offset..offset + 2])
    }

    /// Decode the entry stored at entry number `index`.
    ///
    /// Returns the entry and the next entry number in its chain, or `None` if
    /// the index points into the header or past the end of the blob.
    pub fn entry_at(&self, index: u16) -> Option<(DirectoryEntry, u16)> {
        let index = index as usize;
        if index < HEADER_SLOTS {
            return None;
        }
        let offset = index * ENTRY_SIZE;
        if offset + NAME_OFFSET > self.data.len() {
            return None;
        }

        let slot = &self.data[offset..];
        let next = BigEndian::read_u16(&slot[NEXT_OFFSET..]);
        let vnode = BigEndian::read_u32(&slot[VNODE_OFFSET..]);
        let unique = BigEndian::read_u32(&slot[UNIQUE_OFFSET..]);

        let name_end = (NAME_OFFSET + MAX_NAME_LEN).min(slot.len());
        let name_bytes = &slot[NAME_OFFSET..name_end];
        let end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();

        Some((DirectoryEntry { vnode, unique, name }, next))
    }

    /// Every entry reachable from the hash table, except `.` and `..`
    pub fn entries(&self) -> Vec<DirectoryEntry> {
        let mut entries = Vec::new();
        // A chain cannot be longer than the number of slots without looping
        let max_chain = self.slot_count();

        for bucket in 0..HASH_SIZE {
            let mut index = self.bucket_head(bucket);
            let mut steps = 0;

            while index != 0 {
                steps += 1;
                if steps > max_chain {
                    tracing::warn!("directory hash chain {} loops, abandoning it", bucket);
                    break;
                }

                let Some((entry, next)) = self.entry_at(index) else {
                    tracing::warn!(
                        "directory hash chain {} points at invalid entry {}",
                        bucket,
                        index
                    );
                    break;
                };

                if entry.name != "." && entry.name != ".." {
                    entries.push(entry);
                }
                index = next;
            }
        }

        entries
    }
}

/// Decode a directory vnode's payload into its children
pub fn decode_directory(data: &[u8]) -> Vec<DirectoryEntry> {
    match DirectoryPage::new(data) {
        Some(page) => page.entries(),
        None => {
            tracing::warn!(
                "directory blob of {} bytes is too small for a directory header",
                data.len()
            );
            Vec::new()
        }
    }
}
