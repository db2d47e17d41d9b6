use std::io::{self, Write};

use super::header::{padding_for, TarHeader, BLOCK_SIZE};

/// Zero blocks that close an archive
const END_OF_ARCHIVE_BLOCKS: usize = 2;

/// Block-aligned tar output with a running byte count
pub struct TarWriter<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn write_header(&mut self, header: &TarHeader) -> io::Result<()> {
        self.write_all(header.as_bytes())
    }

    pub fn write_zeros(&mut self, mut count: u64) -> io::Result<()> {
        let zeros = [0u8; BLOCK_SIZE];
        while count > 0 {
            let n = count.min(BLOCK_SIZE as u64) as usize;
            self.write_all(&zeros[..n])?;
            count -= n as u64;
        }
        Ok(())
    }

    /// Pad an entry whose data was `len` bytes long to the next block
    pub fn pad_to_block(&mut self, len: u64) -> io::Result<()> {
        self.write_zeros(padding_for(len) as u64)
    }

    /// Header, in-memory body and padding in one go
    pub fn append(&mut self, header: &TarHeader, data: &[u8]) -> io::Result<()> {
        self.write_header(header)?;
        self.write_all(data)?;
        self.pad_to_block(data.len() as u64)
    }

    /// Write the end-of-archive marker and flush
    pub fn finish(&mut self) -> io::Result<()> {
        self.write_zeros((END_OF_ARCHIVE_BLOCKS * BLOCK_SIZE) as u64)?;
        self.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
