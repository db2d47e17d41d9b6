//! Byte-level reader for the tagged dump stream
//!
//! Every multi-byte scalar in a dump is big-endian. Reads never fail: a short
//! read is logged and counted, and the caller gets whatever was available
//! (zero filled). The format has no resynchronization points, so the decoders
//! keep going and let the record framing decide whether the dump is usable.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read, Write};

/// Chunk size used when streaming or skipping payloads
const COPY_CHUNK: usize = 16 * 1024;

/// Reader for tags, scalars, strings and payload blobs
pub struct TagReader<R> {
    inner: R,
    bytes_read: u64,
    short_reads: u64,
}

impl<R: Read> TagReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
            short_reads: 0,
        }
    }

    /// Total bytes consumed from the underlying stream
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Number of reads that came up short
    pub fn short_reads(&self) -> u64 {
        self.short_reads
    }

    /// Read a `width`-byte big-endian scalar (1, 2 or 4 bytes), right-justified
    /// into an `i32`.
    ///
    /// On a short read the bytes that did arrive stay at the front of the
    /// field and the rest are zero.
    pub fn read_scalar(&mut self, width: usize) -> i32 {
        debug_assert!(matches!(width, 1 | 2 | 4), "unsupported scalar width {width}");
        let width = width.min(4);

        let mut buf = [0u8; 4];
        let got = self.fill(&mut buf[4 - width..]);
        if got != width {
            self.report_short(width as u64, got as u64);
        }

        BigEndian::read_i32(&buf)
    }

    /// Read a 4-byte scalar as unsigned
    pub fn read_u32(&mut self) -> u32 {
        self.read_scalar(4) as u32
    }

    /// Read a single byte; `0` at end of stream
    pub fn read_char(&mut self) -> u8 {
        let mut buf = [0u8; 1];
        if self.fill(&mut buf) != 1 {
            self.report_short(1, 0);
        }
        buf[0]
    }

    /// Read characters up to and including the NUL terminator
    pub fn read_string(&mut self) -> String {
        let mut bytes = Vec::new();
        loop {
            match self.read_char() {
                0 => break,
                c => bytes.push(c),
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Read up to `len` bytes into a new buffer.
    ///
    /// The buffer is shorter than `len` only if the stream ended early.
    pub fn read_blob(&mut self, len: u64) -> Vec<u8> {
        let mut data = Vec::new();
        let got = match (&mut self.inner).take(len).read_to_end(&mut data) {
            Ok(n) => n as u64,
            Err(e) => {
                tracing::warn!("read error after {} bytes: {}", self.bytes_read, e);
                data.len() as u64
            }
        };
        self.bytes_read += got;
        if got != len {
            self.report_short(len, got);
        }
        data
    }

    /// Advance past `len` bytes without retaining them
    pub fn skip(&mut self, len: u64) -> u64 {
        let got = match io::copy(&mut (&mut self.inner).take(len), &mut io::sink()) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("read error after {} bytes: {}", self.bytes_read, e);
                0
            }
        };
        self.bytes_read += got;
        if got != len {
            self.report_short(len, got);
        }
        got
    }

    /// Stream up to `len` bytes into `out`, returning how many were copied.
    ///
    /// Read failures end the copy early; write failures are returned.
    pub fn copy_to<W: Write>(&mut self, len: u64, out: &mut W) -> io::Result<u64> {
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut remaining = len;

        while remaining > 0 {
            let want = remaining.min(COPY_CHUNK as u64) as usize;
            let got = self.fill(&mut buf[..want]);
            out.write_all(&buf[..got])?;
            remaining -= got as u64;
            if got != want {
                // The caller knows which file this was and logs the shortfall
                self.short_reads += 1;
                break;
            }
        }

        Ok(len - remaining)
    }

    /// Read until `buf` is full, end of stream, or an I/O error
    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(
                        "read error after {} bytes: {}",
                        self.bytes_read + filled as u64,
                        e
                    );
                    break;
                }
            }
        }
        self.bytes_read += filled as u64;
        filled
    }

    fn report_short(&mut self, wanted: u64, got: u64) {
        self.short_reads += 1;
        tracing::warn!(
            "short read at offset {}: got {} of {} bytes",
            self.bytes_read,
            got,
            wanted
        );
    }
}
