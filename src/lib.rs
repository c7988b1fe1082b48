//! Multi-threaded bzip2 compression.
//!
//! - Produces standard bzip2 streams readable by any bzip2 decoder.
//! - Compresses independent blocks on multiple threads while one writer
//!   keeps the output in block order, so the stream is byte-identical no
//!   matter how many threads run.
//! - Block sorting picks between a comparison sort and a rank-doubling
//!   sort based on the shape of the data.
//!
//! Compress a stream:
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufWriter;
//!
//! let input = File::open("data.tar").unwrap();
//! let output = BufWriter::new(File::create("data.tar.bz2").unwrap());
//! parbzip2::compress_stream(input, output, 9, 4).unwrap();
//! ```
//!
//! Or write into a compressor incrementally:
//!
//! ```
//! use std::io::Write;
//!
//! let mut out = Vec::new();
//! let mut bz = parbzip2::ParallelWriter::new(&mut out, 9, 4);
//! bz.write_all(b"hello bzip2").unwrap();
//! bz.close().unwrap();
//! ```

pub mod bitstream;
pub mod bwt_algorithms;
pub mod compression;
pub mod huffman_coding;
pub mod tools;

pub use compression::compress::{compress_stream, SequentialWriter};
pub use compression::parallel::{ParallelWriter, MAX_WORKERS};
