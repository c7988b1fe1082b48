//! The compression module drives blocks through the transform pipeline and
//! manages the stream around them.
//!
//! Compression happens in the following steps:
//! - Run Length Encoding 1: collapse runs of 4-255 identical bytes as the
//!   input is carved into blocks.
//! - Burrows-Wheeler Transform: sort each block to gather identical bytes.
//! - Move To Front transform: rewrite bytes as recency indices.
//! - Run Length Encoding 2: collapse the zero-index runs the sort created.
//! - Huffman coding: two to six tables per block, chosen per 50-symbol
//!   group over several refinement passes.
//!
//! Every block is a pure function of its raw bytes, which is what makes the
//! parallel driver possible: workers encode blocks into deferred bit logs
//! while one thread owns the actual output stream and replays the logs in
//! block order. The sequential driver runs the same block pipeline straight
//! into the output stream, and both produce identical bytes for identical
//! input.

pub mod compress;
pub mod compress_block;
pub mod parallel;
