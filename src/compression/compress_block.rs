//! One block, start to finish: header fields, BWT, MTF/RLE2, huffman.

use log::debug;

use crate::bitstream::BitSink;
use crate::bwt_algorithms::bwt_sort::bwt_encode;
use crate::huffman_coding::huffman::huf_encode;
use crate::tools::rle2_mtf::rle2_mtf_encode;

/// Table refinement passes in the huffman stage.
pub const HUFFMAN_PASSES: usize = 4;

#[allow(clippy::unusual_byte_groupings)]
/// Compress one RLE1 block into the sink: six bytes of block magic, the
/// CRC of the raw bytes, the (always clear) randomized bit, the BWT key,
/// then the huffman coded payload. `rle1_data` must not be empty.
pub fn compress_block<S: BitSink>(sink: &mut S, rle1_data: &[u8], block_crc: u32) {
    sink.out24(0x18_314159); // magic bits  1-24
    sink.out24(0x18_265359); // magic bits 25-48
    sink.out32(block_crc);
    sink.out24(0x01_000000); // randomized flag, never set

    let (key, bwt_data) = bwt_encode(rle1_data);
    sink.out24(0x18_000000 | key);

    let (rle2, freq, sym_map) = rle2_mtf_encode(&bwt_data);
    let eob = rle2[rle2.len() - 1];
    huf_encode(sink, &rle2, &freq, &sym_map, eob, HUFFMAN_PASSES);

    debug!(
        "block: {} rle1 bytes, {} syms after MTF & RLE2, {} syms in use",
        rle1_data.len(),
        rle2.len(),
        eob + 1,
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitstream::bitlog::BitLog;
    use crate::bitstream::bitwriter::BitWriter;

    /// The same block through the deferred log and through the real sink
    /// must come out bit-identical.
    #[test]
    fn deferred_and_direct_agree() {
        let data = b"colorless green ideas sleep furiously".repeat(20);

        let mut direct = BitWriter::new(Vec::new());
        compress_block(&mut direct, &data, 0x1234_5678);
        direct.flush_bits();
        direct.flush_writer().unwrap();

        let mut log = BitLog::new();
        compress_block(&mut log, &data, 0x1234_5678);
        let mut replayed = BitWriter::new(Vec::new());
        log.replay(&mut replayed);
        replayed.flush_bits();
        replayed.flush_writer().unwrap();

        assert_eq!(direct.into_inner(), replayed.into_inner());
    }

    /// Block payload starts with the 48-bit block magic.
    #[test]
    fn block_magic_leads() {
        let mut bw = BitWriter::new(Vec::new());
        compress_block(&mut bw, b"x", 0);
        bw.flush_bits();
        bw.flush_writer().unwrap();
        let bytes = bw.into_inner();
        assert_eq!(&bytes[..6], &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59]);
    }
}
