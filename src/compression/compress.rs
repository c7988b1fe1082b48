//! The stream entry point and the single-threaded driver.
//!
//! `compress_stream` copies a reader into a compressing writer and closes
//! it. With `workers == 0` that writer is the [`SequentialWriter`] below,
//! which runs every block through the pipeline on the calling thread,
//! straight into the real bit sink. Any other worker count uses the
//! parallel orchestrator in [`super::parallel`]. The two produce
//! byte-identical streams.

use std::io::{self, Read, Write};

use log::{debug, error, info};

use crate::bitstream::bitwriter::BitWriter;
use crate::tools::crc::do_stream_crc;
use crate::tools::rle1::Rle1Encoder;

use super::compress_block::compress_block;
use super::parallel::ParallelWriter;

/// Raw bytes read per intake chunk for a given level.
pub fn read_block_size(level: usize) -> usize {
    80_000 * level
}

/// Most RLE1 output one block may hold for a given level.
pub fn compress_block_size(level: usize) -> usize {
    100_000 * level
}

pub(crate) fn clamp_level(level: usize) -> usize {
    level.clamp(1, 9)
}

/// Compress everything from `reader` into `writer` as one bzip2 stream.
/// `level` selects the block size (1-9, clamped); `workers` caps the
/// compression threads (0 runs single-threaded on the calling thread,
/// clamped to 128). Output bytes do not depend on the worker count.
pub fn compress_stream<R: Read, W: Write>(
    mut reader: R,
    writer: W,
    level: usize,
    workers: usize,
) -> io::Result<()> {
    let level = clamp_level(level);
    let mut buf = vec![0_u8; read_block_size(level)];

    if workers == 0 {
        let mut out = SequentialWriter::new(writer, level);
        copy_into(&mut reader, &mut out, &mut buf)?;
        out.close()
    } else {
        let mut out = ParallelWriter::new_eager(writer, level, workers);
        copy_into(&mut reader, &mut out, &mut buf)?;
        out.close()
    }
}

fn copy_into<R: Read, W: Write>(reader: &mut R, out: &mut W, buf: &mut [u8]) -> io::Result<()> {
    loop {
        let n = reader.read(buf)?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&buf[..n])?;
    }
}

/// Single-threaded bzip2 writer: absorbs bytes through RLE1 and compresses
/// each block as it fills. `close` writes the stream footer; it runs on
/// drop as a fallback, but only an explicit `close` can report errors.
pub struct SequentialWriter<W: Write> {
    bw: BitWriter<W>,
    rle1: Rle1Encoder,
    level: usize,
    stream_crc: u32,
    raw_in: u64,
    closed: bool,
}

impl<W: Write> SequentialWriter<W> {
    pub fn new(writer: W, level: usize) -> Self {
        let level = clamp_level(level);
        let mut bw = BitWriter::new(writer);
        bw.stream_header(level as u8);
        Self {
            bw,
            rle1: Rle1Encoder::new(compress_block_size(level)),
            level,
            stream_crc: 0,
            raw_in: 0,
            closed: false,
        }
    }

    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])
    }

    fn seal_block(&mut self) -> io::Result<()> {
        let rle1 = std::mem::replace(
            &mut self.rle1,
            Rle1Encoder::new(compress_block_size(self.level)),
        );
        self.raw_in += rle1.raw_len();
        let (data, block_crc) = rle1.finish();
        self.stream_crc = do_stream_crc(self.stream_crc, block_crc);
        compress_block(&mut self.bw, &data, block_crc);
        self.bw.write_out()
    }

    /// Finish the stream: compress the partial block, write the footer, and
    /// flush. Safe to call more than once.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.rle1.is_empty() {
            self.seal_block()?;
        }
        self.bw.stream_footer(self.stream_crc);
        self.bw.flush_writer()?;
        info!(
            "compressed {} bytes to {} bytes single-threaded",
            self.raw_in,
            self.bw.bytes_written()
        );
        Ok(())
    }
}

impl<W: Write> Write for SequentialWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "write on a closed compressor",
            ));
        }
        let mut off = 0;
        while off < buf.len() {
            off += self.rle1.write(&buf[off..]);
            if self.rle1.is_full() {
                debug!("sealing block at {} raw bytes", self.rle1.raw_len());
                self.seal_block()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Bits still queued stay queued; only completed bytes can move
        self.bw.flush_writer()
    }
}

impl<W: Write> Drop for SequentialWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!("error finishing bzip2 stream on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_input_is_bare_header_and_footer() {
        let mut out = Vec::new();
        compress_stream(&b""[..], &mut out, 9, 0).unwrap();
        assert_eq!(
            out,
            vec![0x42, 0x5A, 0x68, 0x39, 0x17, 0x72, 0x45, 0x38, 0x50, 0x90, 0, 0, 0, 0]
        );
    }

    #[test]
    fn header_carries_clamped_level() {
        let mut out = Vec::new();
        compress_stream(&b""[..], &mut out, 42, 0).unwrap();
        assert_eq!(&out[..4], b"BZh9");
        let mut out = Vec::new();
        compress_stream(&b""[..], &mut out, 0, 0).unwrap();
        assert_eq!(&out[..4], b"BZh1");
    }

    #[test]
    fn single_byte_makes_one_block() {
        let mut out = Vec::new();
        compress_stream(&[0x00][..], &mut out, 9, 0).unwrap();
        assert_eq!(&out[..4], b"BZh9");
        // Block magic follows the header immediately (byte aligned here)
        assert_eq!(&out[4..10], &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59]);
        assert!(out.len() > 14);
    }

    #[test]
    fn close_is_idempotent() {
        let mut w = SequentialWriter::new(Vec::new(), 1);
        w.write_all(b"hello").unwrap();
        w.close().unwrap();
        w.close().unwrap();
    }

    #[test]
    fn write_after_close_fails() {
        let mut w = SequentialWriter::new(Vec::new(), 1);
        w.close().unwrap();
        assert_eq!(
            w.write(b"x").unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }

    #[test]
    fn multi_block_input_splits() {
        // Incompressible-ish data larger than one level-1 block
        let mut data = Vec::with_capacity(250_000);
        let mut x = 0x9E3779B9_u32;
        for _ in 0..250_000 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            data.push(x as u8);
        }
        let mut out = Vec::new();
        compress_stream(&data[..], &mut out, 1, 0).unwrap();
        // Three blocks of ~100k RLE1 bytes each; the stream must at least
        // hold the header, three block magics, and the footer
        assert!(out.len() > 50);
        assert_eq!(&out[..4], b"BZh1");
    }
}
