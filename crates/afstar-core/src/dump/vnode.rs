//! Vnode records
//!
//! A vnode record starts with the vnode id and uniquifier, followed by tagged
//! fields. The size tag (`f`, or `h` for large files) is always the last field
//! and the payload follows it directly: file contents, the directory page
//! blob, or the symlink target.

use serde::{Deserialize, Serialize};
use std::io::Read;

use super::{RecordKind, TagReader, TagStep, TaggedRecord};

/// Capacity of the access list stored in a vnode
pub const ACL_MAX_ENTRIES: usize = 21;

/// Tag of the 64-bit size field
pub const TAG_LARGE_SIZE: u8 = b'h';

/// Tag of the 32-bit size field
pub const TAG_SIZE: u8 = b'f';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VNodeType {
    /// Free slot, no data
    #[default]
    None,
    File,
    Directory,
    /// Symbolic link or mount point
    Symlink,
    Unknown(i32),
}

impl From<i32> for VNodeType {
    fn from(value: i32) -> Self {
        match value {
            0 => VNodeType::None,
            1 => VNodeType::File,
            2 => VNodeType::Directory,
            3 => VNodeType::Symlink,
            other => VNodeType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// Protection server id of the user or group
    pub id: i32,
    /// Rights bit mask
    pub rights: i32,
}

/// Directory access list. Positive entries come first, negative entries
/// follow them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub size: i32,
    pub version: i32,
    pub total: i32,
    pub positive: i32,
    pub negative: i32,
    pub entries: [AclEntry; ACL_MAX_ENTRIES],
    pub unused: i32,
}

impl Acl {
    /// Size of the ACL block on the wire: five counters, the entry table and a
    /// trailing word
    pub const WIRE_SIZE: u64 = 4 * 5 + 8 * ACL_MAX_ENTRIES as u64 + 4;

    pub fn read<R: Read>(reader: &mut TagReader<R>) -> Self {
        let mut acl = Acl {
            size: reader.read_scalar(4),
            version: reader.read_scalar(4),
            total: reader.read_scalar(4),
            positive: reader.read_scalar(4),
            negative: reader.read_scalar(4),
            ..Default::default()
        };
        for entry in acl.entries.iter_mut() {
            entry.id = reader.read_scalar(4);
            entry.rights = reader.read_scalar(4);
        }
        acl.unused = reader.read_scalar(4);
        acl
    }

    pub fn positive_entries(&self) -> &[AclEntry] {
        &self.entries[..self.positive_end()]
    }

    pub fn negative_entries(&self) -> &[AclEntry] {
        let start = self.positive_end();
        let end = (start as i64 + self.negative.max(0) as i64).min(ACL_MAX_ENTRIES as i64);
        &self.entries[start..end as usize]
    }

    fn positive_end(&self) -> usize {
        (self.positive.max(0) as usize).min(ACL_MAX_ENTRIES)
    }
}

/// One filesystem object from the dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VNode {
    pub id: u32,
    pub uniquifier: u32,
    pub vtype: VNodeType,
    pub link_count: u16,
    pub data_version: u32,
    pub unix_mod_time: u32,
    pub server_mod_time: u32,
    pub author: u32,
    pub owner: u32,
    pub group: u32,
    pub mode_bits: u16,
    pub parent: u32,
    pub acl: Acl,
    pub data_size: u64,
}

impl VNode {
    /// Read the id and uniquifier that open a vnode record
    pub fn read_start<R: Read>(reader: &mut TagReader<R>) -> Self {
        VNode {
            id: reader.read_u32(),
            uniquifier: reader.read_u32(),
            ..Default::default()
        }
    }

    /// Registry key of the directory this vnode is archived under.
    ///
    /// Directories are keyed by their own id, everything else by its parent.
    pub fn container_id(&self) -> u32 {
        match self.vtype {
            VNodeType::Directory => self.id,
            _ => self.parent,
        }
    }
}

impl TaggedRecord for VNode {
    const KIND: RecordKind = RecordKind::VNode;

    fn apply_tag<R: Read>(&mut self, tag: u8, reader: &mut TagReader<R>) -> TagStep {
        match tag {
            b't' => self.vtype = VNodeType::from(reader.read_scalar(1)),
            b'l' => self.link_count = reader.read_scalar(2) as u16,
            b'v' => self.data_version = reader.read_u32(),
            b'm' => self.unix_mod_time = reader.read_u32(),
            b's' => self.server_mod_time = reader.read_u32(),
            b'a' => self.author = reader.read_u32(),
            b'o' => self.owner = reader.read_u32(),
            b'g' => self.group = reader.read_u32(),
            b'b' => self.mode_bits = reader.read_scalar(2) as u16,
            b'p' => self.parent = reader.read_u32(),
            b'A' => self.acl = Acl::read(reader),
            TAG_LARGE_SIZE => {
                let hi = reader.read_u32() as u64;
                let lo = reader.read_u32() as u64;
                self.data_size = (hi << 32) | lo;
                return TagStep::Payload;
            }
            TAG_SIZE => {
                self.data_size = reader.read_u32() as u64;
                return TagStep::Payload;
            }
            other => return TagStep::Done(other),
        }
        TagStep::Continue
    }
}
