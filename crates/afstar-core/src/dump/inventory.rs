//! Read-only walk over a dump, for reporting what it contains

use serde::{Deserialize, Serialize};
use std::io::Read;

use super::vnode::TAG_LARGE_SIZE;
use super::{
    DumpHeader, RecordKind, TagReader, TagStep, TaggedRecord, VNode, VNodeType, VolumeHeader,
    DUMP_END_MAGIC,
};
use crate::error::{ConvertError, Result};

/// Counts for one volume section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeInventory {
    pub header: VolumeHeader,
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub other_vnodes: u64,
    pub data_bytes: u64,
}

/// Summary of a whole dump
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DumpInventory {
    pub header: DumpHeader,
    pub volumes: Vec<VolumeInventory>,
    pub bytes_read: u64,
    pub short_reads: u64,
}

/// Walk every record of a dump, skipping payloads.
///
/// Applies the same framing rules as the converter, so a dump that inspects
/// cleanly will convert without fatal errors.
pub fn inspect<R: Read>(input: R, large_files: bool) -> Result<DumpInventory> {
    let mut reader = TagReader::new(input);

    let record = reader.read_scalar(1);
    if record != RecordKind::DumpHeader.tag() as i32 {
        return Err(ConvertError::NotADump(record));
    }

    let (header, mut tag) = DumpHeader::read(&mut reader)?;
    let mut volumes = Vec::new();

    while tag == RecordKind::VolumeHeader.tag() {
        let (volume_header, next) = VolumeHeader::read(&mut reader);
        let mut volume = VolumeInventory {
            header: volume_header,
            ..Default::default()
        };

        tag = next;
        while tag == RecordKind::VNode.tag() {
            tag = skim_vnode(&mut reader, &mut volume, large_files);
        }
        volumes.push(volume);
    }

    if tag != RecordKind::DumpEnd.tag() {
        return Err(ConvertError::UnexpectedRecord {
            expected: "end of dump",
            found: tag,
        });
    }

    let end_magic = reader.read_u32();
    if end_magic != DUMP_END_MAGIC {
        tracing::warn!(
            "end of dump magic is 0x{:08X}, expected 0x{:08X}",
            end_magic,
            DUMP_END_MAGIC
        );
    }

    Ok(DumpInventory {
        header,
        volumes,
        bytes_read: reader.bytes_read(),
        short_reads: reader.short_reads(),
    })
}

fn skim_vnode<R: Read>(reader: &mut TagReader<R>, volume: &mut VolumeInventory, large_files: bool) -> u8 {
    let mut vnode = VNode::read_start(reader);
    loop {
        let tag = reader.read_char();
        if tag == TAG_LARGE_SIZE && !large_files {
            return tag;
        }
        match vnode.apply_tag(tag, reader) {
            TagStep::Continue => {}
            TagStep::Payload => {
                match vnode.vtype {
                    VNodeType::File => volume.files += 1,
                    VNodeType::Directory => volume.directories += 1,
                    VNodeType::Symlink => volume.symlinks += 1,
                    _ => volume.other_vnodes += 1,
                }
                volume.data_bytes += vnode.data_size;
                reader.skip(vnode.data_size);
            }
            TagStep::Done(tag) => return tag,
        }
    }
}
