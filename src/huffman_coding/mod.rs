//! The huffman_coding module turns the MTF/RLE2 symbol stream into the final
//! coded bits of a block.
//!
//! Bzip2's huffman stage is chunk oriented: between two and six coding
//! tables are built per block, and every 50-symbol group of the stream is
//! assigned whichever table codes it cheapest. The tables start from a crude
//! frequency partition and are refined over several passes against the real
//! data before the codes are finalized. Code lengths are capped at 17 bits,
//! which the length builder enforces by flattening the weight distribution
//! and retrying.

pub mod huffman;
pub mod huffman_code_from_weights;
