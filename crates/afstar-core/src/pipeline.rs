//! Dump to tar conversion driver
//!
//! Records are processed strictly in arrival order:
//! dump header, then for each volume its header and vnodes, then the end of
//! dump marker. Directories are decoded as they stream past so that their
//! children can be named; vnodes whose container is still unknown are parked
//! in the orphan buffer and replayed once the stream is exhausted.

use std::io::{Read, Write};

use crate::directory::decode_directory;
use crate::dump::vnode::TAG_LARGE_SIZE;
use crate::dump::{
    DumpHeader, RecordKind, TagReader, TagStep, TaggedRecord, VNode, VNodeType, VolumeHeader,
    DUMP_END_MAGIC,
};
use crate::error::{ConvertError, Result};
use crate::resolve::{OrphanBuffer, OrphanRecord, PathRegistry};
use crate::tar::{entry, restore_script, TarWriter, ACL_SCRIPT_NAME};
use crate::{ConversionSummary, ConvertConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertStage {
    Volumes,
    Orphans,
    Complete,
}

#[derive(Debug, Clone)]
pub struct ConvertProgress {
    pub stage: ConvertStage,
    pub bytes_read: u64,
    pub vnodes: u64,
    pub entries_written: u64,
    pub pending_orphans: usize,
}

/// Converts one dump stream into a tar stream
pub struct Converter<W: Write> {
    config: ConvertConfig,
    writer: TarWriter<W>,
    registry: PathRegistry,
    orphans: OrphanBuffer,
    summary: ConversionSummary,
    progress_callback: Option<Box<dyn Fn(ConvertProgress) + Send + Sync>>,
}

impl<W: Write> Converter<W> {
    pub fn new(output: W, config: ConvertConfig) -> Self {
        Self {
            config,
            writer: TarWriter::new(output),
            registry: PathRegistry::new(),
            orphans: OrphanBuffer::new(),
            summary: ConversionSummary::default(),
            progress_callback: None,
        }
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(ConvertProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Read the whole dump from `input` and write the archive.
    ///
    /// Only header corruption and broken record framing are errors; anything
    /// else is logged and the conversion carries on.
    pub fn convert<R: Read>(&mut self, input: R) -> Result<ConversionSummary> {
        let mut reader = TagReader::new(input);

        let record = reader.read_scalar(1);
        if record != RecordKind::DumpHeader.tag() as i32 {
            return Err(ConvertError::NotADump(record));
        }

        let (header, mut tag) = DumpHeader::read(&mut reader)?;
        if self.config.verbose > 1 {
            tracing::info!(
                "Converting volume dump of '{}' to tar format.",
                header.volume_name
            );
        }
        self.summary.volume_name = header.volume_name;

        while tag == RecordKind::VolumeHeader.tag() {
            let (volume, next) = VolumeHeader::read(&mut reader);
            self.summary.volumes += 1;
            tracing::debug!("volume {} ({})", volume.volume_id, volume.volume_name);

            let written_before = self.writer.bytes_written();
            tag = next;
            while tag == RecordKind::VNode.tag() {
                tag = self.read_vnode(&mut reader)?;
                self.summary.vnodes += 1;
                self.emit_progress(ConvertStage::Volumes, reader.bytes_read());
            }

            if self.config.verbose > 1 {
                tracing::info!(
                    "volume '{}': {} bytes written",
                    volume.volume_name,
                    self.writer.bytes_written() - written_before
                );
            }
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

        self.emit_progress(ConvertStage::Orphans, reader.bytes_read());
        self.resolve_orphans()?;

        self.writer.finish()?;

        self.summary.bytes_read = reader.bytes_read();
        self.summary.short_reads = reader.short_reads();
        self.summary.bytes_written = self.writer.bytes_written();
        self.emit_progress(ConvertStage::Complete, reader.bytes_read());

        tracing::debug!(
            "conversion done: {} paths registered, {} entries written",
            self.registry.len(),
            self.summary.entries_written
        );
        Ok(self.summary.clone())
    }

    /// Decode one vnode record, handling its payload inline. Returns the tag
    /// that ended the record.
    fn read_vnode<R: Read>(&mut self, reader: &mut TagReader<R>) -> Result<u8> {
        let mut vnode = VNode::read_start(reader);

        loop {
            let tag = reader.read_char();
            // Without large file support the 64-bit size tag is foreign
            if tag == TAG_LARGE_SIZE && !self.config.large_files {
                return Ok(tag);
            }

            match vnode.apply_tag(tag, reader) {
                TagStep::Continue => {}
                TagStep::Payload => {
                    if let Some(record) = self.process_vnode(&vnode, reader)? {
                        tracing::debug!(
                            "vnode {} deferred, container {} not resolved yet",
                            vnode.id,
                            vnode.container_id()
                        );
                        self.summary.orphans_deferred += 1;
                        self.orphans.push(record);
                    }
                }
                TagStep::Done(tag) => return Ok(tag),
            }
        }
    }

    /// Archive a vnode whose header has been read, consuming its payload.
    ///
    /// Returns the vnode and its payload if it cannot be placed yet.
    fn process_vnode<S: Read>(
        &mut self,
        vnode: &VNode,
        payload: &mut TagReader<S>,
    ) -> Result<Option<OrphanRecord>> {
        match vnode.vtype {
            VNodeType::File | VNodeType::Directory | VNodeType::Symlink => {}
            VNodeType::None => {
                payload.skip(vnode.data_size);
                return Ok(None);
            }
            VNodeType::Unknown(vtype) => {
                tracing::warn!("unknown vnode block: vnode {} has type {}", vnode.id, vtype);
                payload.skip(vnode.data_size);
                return Ok(None);
            }
        }

        let Some(dir) = self.registry.resolve(vnode.container_id()).map(str::to_owned) else {
            return Ok(Some(defer(vnode, payload)));
        };

        if vnode.vtype == VNodeType::Directory {
            self.write_directory(vnode, &dir, payload)?;
            return Ok(None);
        }

        let Some(name) = self.registry.resolve(vnode.id).map(str::to_owned) else {
            return Ok(Some(defer(vnode, payload)));
        };

        if vnode.vtype == VNodeType::File {
            self.write_file(vnode, &dir, &name, payload)?;
        } else {
            self.write_symlink(vnode, &dir, &name, payload)?;
        }
        Ok(None)
    }

    fn write_directory<S: Read>(
        &mut self,
        vnode: &VNode,
        path: &str,
        payload: &mut TagReader<S>,
    ) -> Result<()> {
        self.echo(format_args!("{}/", path));
        self.writer.write_header(&entry::directory_header(vnode, path))?;
        self.summary.entries_written += 1;

        if self.config.acl_scripts {
            let script = restore_script(&vnode.acl);
            self.echo(format_args!("{}/{}", path, ACL_SCRIPT_NAME));
            self.writer.append(
                &entry::acl_script_header(vnode, path, script.len()),
                script.as_bytes(),
            )?;
            self.summary.entries_written += 1;
            self.summary.acl_scripts_written += 1;
        }

        let blob = payload.read_blob(vnode.data_size);
        let children = decode_directory(&blob);
        let count = self.registry.register_children(path, &children);
        tracing::debug!("directory {} ({}) lists {} entries", vnode.id, path, count);
        Ok(())
    }

    fn write_file<S: Read>(
        &mut self,
        vnode: &VNode,
        dir: &str,
        name: &str,
        payload: &mut TagReader<S>,
    ) -> Result<()> {
        self.echo(format_args!("{}/{}", dir, name));
        self.writer.write_header(&entry::file_header(vnode, dir, name))?;
        self.summary.entries_written += 1;

        let copied = payload.copy_to(vnode.data_size, &mut self.writer)?;
        if copied < vnode.data_size {
            let missing = vnode.data_size - copied;
            tracing::warn!(
                "File {}/{} is incomplete: read {} bytes out of {}, zero filling {}",
                dir,
                name,
                copied,
                vnode.data_size,
                missing
            );
            self.writer.write_zeros(missing)?;
        }
        self.writer.pad_to_block(vnode.data_size)?;

        if self.config.verbose > 1 {
            tracing::info!("{}/{}: {} bytes", dir, name, vnode.data_size);
        }
        Ok(())
    }

    fn write_symlink<S: Read>(
        &mut self,
        vnode: &VNode,
        dir: &str,
        name: &str,
        payload: &mut TagReader<S>,
    ) -> Result<()> {
        let data = payload.read_blob(vnode.data_size);
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        let target = String::from_utf8_lossy(&data[..end]);

        self.echo(format_args!("{}/{}", dir, name));
        self.writer
            .write_header(&entry::symlink_header(vnode, dir, name, &target))?;
        self.summary.entries_written += 1;
        Ok(())
    }

    /// Replay the orphan buffer until it is empty or stops shrinking
    fn resolve_orphans(&mut self) -> Result<()> {
        if self.orphans.is_empty() {
            return Ok(());
        }
        tracing::info!(
            "resolving {} orphaned vnodes: {:?}",
            self.orphans.len(),
            self.orphans.ids()
        );

        let mut orphans = std::mem::take(&mut self.orphans);
        let outcome = orphans.drain_with(|record, next| -> Result<()> {
            let mut payload = TagReader::new(record.payload.as_slice());
            if let Some(again) = self.process_vnode(&record.vnode, &mut payload)? {
                next.push(again);
            }
            Ok(())
        })?;

        self.summary.orphan_passes = outcome.passes as u32;
        self.summary.orphans_resolved = outcome.resolved as u64;
        for record in &outcome.unresolved {
            tracing::warn!(
                "vnode {} is orphaned: container {} never resolved, not archived",
                record.vnode.id,
                record.vnode.container_id()
            );
            self.summary.orphans_dropped.push(record.vnode.id);
        }
        Ok(())
    }

    fn echo(&self, path: std::fmt::Arguments<'_>) {
        if self.config.verbose > 0 {
            tracing::info!("{}", path);
        }
    }

    fn emit_progress(&self, stage: ConvertStage, bytes_read: u64) {
        if let Some(ref callback) = self.progress_callback {
            callback(ConvertProgress {
                stage,
                bytes_read,
                vnodes: self.summary.vnodes,
                entries_written: self.summary.entries_written,
                pending_orphans: self.orphans.len(),
            });
        }
    }
}

/// Take the payload off the stream so the vnode can be replayed later
fn defer<S: Read>(vnode: &VNode, payload: &mut TagReader<S>) -> OrphanRecord {
    OrphanRecord {
        vnode: vnode.clone(),
        payload: payload.read_blob(vnode.data_size),
    }
}
