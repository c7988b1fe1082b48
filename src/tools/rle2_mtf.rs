//! Move-to-front transform and Run-Length-Encoding phase 2, integrated for
//! speed, plus the symbol map the block header needs.
//!
//! The move-to-front transform rewrites each byte of the sorted block as its
//! index in a recency list of the symbols actually in use, so recently seen
//! bytes come out as small indices. Zero indices dominate after the sort, and
//! RLE2 collapses every maximal run of them into a binary counting scheme
//! over two dedicated symbols, RUNA and RUNB. Non-zero indices shift up by
//! one to make room, and a single end-of-block symbol closes the stream, so
//! the output alphabet is the in-use count plus two.
//!
//! Encoding also returns the frequency table and symbol map used during the
//! huffman stage.

use super::freq_count::freqs;

/// One symbol past EOB can never exceed 258 (256 bytes + RUNB + EOB).
pub const MAX_ALPHA_SIZE: usize = 258;

const BIT_MASK: u16 = 0x8000;

/// Transforms one block of sorted data. Returns the RLE2 symbol stream
/// (ending with EOB), the symbol frequency table, and the symbol map.
pub fn rle2_mtf_encode(block: &[u8]) -> (Vec<u16>, [u32; MAX_ALPHA_SIZE], Vec<u16>) {
    let counts = freqs(block);
    let mut used = [false; 256];
    for (sym, &count) in counts.iter().enumerate() {
        used[sym] = count != 0;
    }

    // Recency list over the symbols in use, smallest first
    let mut mtf_index: Vec<u8> = used
        .iter()
        .enumerate()
        .filter(|(_, &u)| u)
        .map(|(sym, _)| sym as u8)
        .collect();

    let eob = mtf_index.len() as u16 + 1;
    let sym_map = encode_sym_map(&used);

    let mut rle2: Vec<u16> = Vec::with_capacity(block.len() + 1);
    let mut freq = [0_u32; MAX_ALPHA_SIZE];
    let mut zeros = 0_usize;

    for byte in block {
        let mut idx = mtf_index.iter().position(|sym| sym == byte).unwrap();
        if idx == 0 {
            zeros += 1;
            continue;
        }
        // A non-zero index ends any pending zero run
        if zeros > 0 {
            push_zero_run(zeros, &mut rle2, &mut freq);
            zeros = 0;
        }
        rle2.push(idx as u16 + 1);
        freq[idx + 1] += 1;

        // Pull the symbol to the front, shifting in blocks of four first
        let sym = mtf_index[idx];
        while idx > 3 {
            mtf_index[idx] = mtf_index[idx - 1];
            mtf_index[idx - 1] = mtf_index[idx - 2];
            mtf_index[idx - 2] = mtf_index[idx - 3];
            mtf_index[idx - 3] = mtf_index[idx - 4];
            idx -= 4;
        }
        while idx > 0 {
            mtf_index[idx] = mtf_index[idx - 1];
            idx -= 1;
        }
        mtf_index[0] = sym;
    }

    if zeros > 0 {
        push_zero_run(zeros, &mut rle2, &mut freq);
    }

    rle2.push(eob);
    freq[eob as usize] += 1;

    (rle2, freq, sym_map)
}

/// Emit a run of `zeros` zero-indices as RUNA/RUNB symbols: the run length
/// plus one written in base 2 starting from the low bit, high bit dropped.
fn push_zero_run(zeros: usize, rle2: &mut Vec<u16>, freq: &mut [u32; MAX_ALPHA_SIZE]) {
    let mut n = zeros - 1;
    loop {
        let sym = (n & 1) as u16; // RUNA = 0, RUNB = 1
        rle2.push(sym);
        freq[sym as usize] += 1;
        if n < 2 {
            break;
        }
        n = (n - 2) >> 1;
    }
}

/// Builds the two-level bzip2 symbol map: a 16-bit index of which 16-symbol
/// groups hold any used symbol, followed by one 16-bit map per used group.
fn encode_sym_map(used: &[bool; 256]) -> Vec<u16> {
    let mut maps: Vec<u16> = vec![0; 17];
    for (sym, &in_use) in used.iter().enumerate() {
        if in_use {
            maps[0] |= BIT_MASK >> (sym >> 4);
            maps[1 + (sym >> 4)] |= BIT_MASK >> (sym & 15);
        }
    }
    // Groups with no symbols are left out entirely
    maps.retain(|&map| map > 0);
    maps
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sym_map_two_symbols_one_group() {
        // 'a' (97) and 'b' (98) share group 6
        let (_, _, map) = rle2_mtf_encode(b"aab");
        assert_eq!(map, vec![0x0200, 0x6000]);
    }

    #[test]
    fn sym_map_full_alphabet() {
        let all: Vec<u8> = (0..=255).collect();
        let (_, _, map) = rle2_mtf_encode(&all);
        assert_eq!(map.len(), 17);
        assert!(map.iter().all(|&m| m == 0xFFFF));
    }

    #[test]
    fn small_block_symbols() {
        // block "aab": 'a' hits index 0 twice (zero run of 2 -> RUNB),
        // 'b' is index 1 -> symbol 2, then EOB = 3
        let (rle2, freq, _) = rle2_mtf_encode(b"aab");
        assert_eq!(rle2, vec![1, 2, 3]);
        assert_eq!(freq[0], 0);
        assert_eq!(freq[1], 1);
        assert_eq!(freq[2], 1);
        assert_eq!(freq[3], 1);
    }

    #[test]
    fn zero_run_encoding() {
        // Runs of N zero-indices written per the RUNA/RUNB counting scheme
        let cases: Vec<(usize, Vec<u16>)> = vec![
            (1, vec![0]),
            (2, vec![1]),
            (3, vec![0, 0]),
            (4, vec![1, 0]),
            (5, vec![0, 1]),
            (6, vec![1, 1]),
            (7, vec![0, 0, 0]),
        ];
        for (n, expected) in cases {
            let mut rle2 = Vec::new();
            let mut freq = [0u32; MAX_ALPHA_SIZE];
            push_zero_run(n, &mut rle2, &mut freq);
            assert_eq!(rle2, expected, "run of {}", n);
        }
    }

    #[test]
    fn eob_always_last_and_counted() {
        let (rle2, freq, _) = rle2_mtf_encode(b"mississippi");
        let eob = *rle2.last().unwrap();
        // i, m, p, s in use -> eob = 5
        assert_eq!(eob, 5);
        assert_eq!(freq[eob as usize], 1);
        assert_eq!(rle2.iter().filter(|&&s| s == eob).count(), 1);
    }

    #[test]
    fn frequencies_match_stream() {
        let (rle2, freq, _) = rle2_mtf_encode(b"the theory of everything");
        let mut recount = [0u32; MAX_ALPHA_SIZE];
        for &sym in &rle2 {
            recount[sym as usize] += 1;
        }
        assert_eq!(freq, recount);
    }
}
