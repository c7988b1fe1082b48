//! Multi-table huffman coding of one block's MTF/RLE2 symbol stream.
//!
//! Encodes the stream 50 symbols at a time, choosing for each group the
//! cheapest of several coding tables, then writes the table descriptions,
//! the group selectors, and the coded symbols to the bit sink.

use std::cmp::Ordering;

use log::{error, trace};

use crate::bitstream::BitSink;
use crate::tools::rle2_mtf::MAX_ALPHA_SIZE;

use super::huffman_code_from_weights::improve_code_len_from_weights;

/// Symbols per selector group.
const GROUP_SIZE: usize = 50;

/// Huffman tree node; the packed weight carries subtree depth in its low
/// byte so joins can track the depth cap.
#[derive(Debug, Clone)]
pub struct Node {
    pub weight: u32,
    pub node_data: NodeData,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Kids(Box<Node>, Box<Node>),
    Leaf(u16),
}

impl Node {
    pub fn new(weight: u32, node_data: NodeData) -> Node {
        Node { weight, node_data }
    }
}

impl Ord for Node {
    /// Descending by packed weight, so the lightest nodes pop off the end.
    fn cmp(&self, other: &Self) -> Ordering {
        other.weight.cmp(&self.weight)
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight
    }
}

impl Eq for Node {}

#[allow(clippy::unusual_byte_groupings)]
/// Encode the RLE2 symbol stream using the multi-table system: `iterations`
/// refinement passes (the reference compressor uses four), then the table
/// and selector metadata and the coded symbols go out through the sink.
pub fn huf_encode<S: BitSink>(
    bw: &mut S,
    rle2: &[u16],
    freq: &[u32; MAX_ALPHA_SIZE],
    sym_map: &[u16],
    eob: u16,
    iterations: usize,
) {
    let alpha_size = eob as usize + 1;

    // Two to six coding tables depending on how much data is coming in
    let table_count: usize = match rle2.len() {
        0..=199 => 2,
        200..=599 => 3,
        600..=1199 => 4,
        1200..=2399 => 5,
        _ => 6,
    };

    let mut tables = init_tables(freq, table_count, eob);

    let selector_count = rle2.len().div_ceil(GROUP_SIZE);
    let mut selectors = vec![0_usize; selector_count];

    /*
     The initial tables split the symbols by frequency ratio: each symbol is
     weighted 0 in its own table and 15 everywhere else. Each pass below
     scores every 50-symbol group against every table, hands the group to
     the cheapest one, then rebuilds each table's code lengths from the
     frequencies of the groups it won. The lengths double as the next pass's
     weights. Selectors are recorded on the final pass.
    */
    for iter in 0..iterations {
        let mut favorites = [0_usize; 6];
        let mut total_cost = 0_u32;
        let mut rfreq = [[0_u32; MAX_ALPHA_SIZE]; 6];

        rle2.chunks(GROUP_SIZE).enumerate().for_each(|(i, group)| {
            let mut cost = [0_u32; 6];
            group.iter().for_each(|&symbol| {
                (0..table_count).for_each(|t| cost[t] += tables[t][symbol as usize])
            });

            // First table with the lowest cost wins the group
            let min = *cost[..table_count].iter().min().unwrap();
            let bt = cost[..table_count].iter().position(|&c| c == min).unwrap();

            total_cost += cost[bt];
            favorites[bt] += 1;
            group
                .iter()
                .for_each(|&symbol| rfreq[bt][symbol as usize] += 1);

            if iter == iterations - 1 {
                selectors[i] = bt;
            }
        });

        trace!(
            " pass {}: best cost is {}, grp uses are {:?}",
            iter + 1,
            total_cost / 8,
            favorites
        );

        (0..table_count).for_each(|t| {
            improve_code_len_from_weights(&mut tables[t], &rfreq[t], eob);
        });
    }

    // Symbol maps: 16-bit group index plus one 16-bit word per used group
    for &word in sym_map {
        bw.out16(word);
    }

    // A 3 bit table count, then a 15 bit selector count
    bw.out24((3 << 24) | table_count as u32);
    bw.out24((15 << 24) | selector_count as u32);

    /*
    Selectors name the table for each 50-symbol group, but go to the stream
    move-to-front transformed over the table ids and unary coded: rank k
    becomes k one-bits and a zero.
    */
    let mut table_mtf: Vec<usize> = (0..6).collect();
    for &selector in &selectors {
        let rank = table_mtf.iter().position(|&t| t == selector).unwrap();
        let id = table_mtf.remove(rank);
        table_mtf.insert(0, id);
        match rank {
            0 => bw.out24(0x01_000000),
            1 => bw.out24(0x02_000002),
            2 => bw.out24(0x03_000006),
            3 => bw.out24(0x04_00000e),
            4 => bw.out24(0x05_00001e),
            5 => bw.out24(0x06_00003e),
            bad => error!("selector rank {} cannot happen", bad),
        }
    }

    // Build each table's canonical codes and write its length description
    let mut out_code_tables: Vec<Vec<u32>> = Vec::with_capacity(table_count);
    for table in tables.iter().take(table_count) {
        // Codes run sequentially inside each length, shifting left when the
        // length steps up
        let mut len_sym: Vec<(u32, u16)> = table
            .iter()
            .take(alpha_size)
            .enumerate()
            .map(|(sym, &len)| (len, sym as u16))
            .collect();
        len_sym.sort_unstable();

        let mut codes = vec![0_u32; alpha_size];
        let mut next_code: (u32, u32) = (len_sym[0].0, 0);
        for &(len, sym) in &len_sym {
            if len != next_code.0 {
                next_code.1 <<= len - next_code.0;
                next_code.0 = len;
            }
            // Sink format: length in the high byte, code in the low bits
            codes[sym as usize] = (len << 24) | next_code.1;
            next_code.1 += 1;
        }

        /*
        Lengths go to the stream in symbol order as deltas: a five bit
        starting length, then per symbol a walk of 2-bit steps (10 = up,
        11 = down) closed by a zero bit. The first symbol's walk is always
        empty but still gets its closing bit.
        */
        len_sym.sort_unstable_by_key(|&(_, sym)| sym);
        let origin = len_sym[0].0;
        bw.out24((5 << 24) | origin);
        let mut current = origin as i32;
        for &(len, _) in &len_sym {
            let mut delta = len as i32 - current;
            current = len as i32;
            loop {
                match delta.cmp(&0) {
                    Ordering::Greater => {
                        bw.out24(0x02_000002);
                        delta -= 1;
                    }
                    Ordering::Less => {
                        bw.out24(0x02_000003);
                        delta += 1;
                    }
                    Ordering::Equal => break,
                }
            }
            bw.out24(0x01_000000);
        }

        out_code_tables.push(codes);
    }

    // Finally the data itself, each group under its selected table
    for (i, group) in rle2.chunks(GROUP_SIZE).enumerate() {
        let codes = &out_code_tables[selectors[i]];
        group
            .iter()
            .for_each(|&symbol| bw.out24(codes[symbol as usize]));
    }
}

/// Initial coding tables: walk the symbols accumulating frequency until a
/// table has roughly its share, give it length 0 for that span and 15
/// everywhere else, and move on to the next table. Alternating slices stop
/// one symbol short so the later tables are not starved.
fn init_tables(freq: &[u32; MAX_ALPHA_SIZE], table_count: usize, eob: u16) -> [[u32; MAX_ALPHA_SIZE]; 6] {
    let alpha_size = eob as usize + 1;
    let mut tables = [[15_u32; MAX_ALPHA_SIZE]; 6];

    let mut rem_freq: u32 = freq[..alpha_size].iter().sum();
    let mut gs = 0_usize;

    for part in (1..=table_count).rev() {
        let target = rem_freq / part as u32;
        let mut ge = gs;
        let mut acc = 0_u32;
        while acc < target && ge < alpha_size {
            acc += freq[ge];
            ge += 1;
        }
        if ge > gs + 1 && part != table_count && part != 1 && (table_count - part) % 2 == 1 {
            ge -= 1;
            acc -= freq[ge];
        }
        for slot in tables[part - 1].iter_mut().take(ge).skip(gs) {
            *slot = 0;
        }
        gs = ge;
        rem_freq -= acc;
    }
    tables
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitstream::bitlog::BitLog;
    use crate::tools::rle2_mtf::rle2_mtf_encode;

    #[test]
    fn table_count_scales_with_stream_length() {
        // Thresholds straight from the block format
        let count = |n: usize| match n {
            0..=199 => 2,
            200..=599 => 3,
            600..=1199 => 4,
            1200..=2399 => 5,
            _ => 6,
        };
        assert_eq!(count(1), 2);
        assert_eq!(count(199), 2);
        assert_eq!(count(200), 3);
        assert_eq!(count(2400), 6);
    }

    #[test]
    fn init_tables_cover_every_symbol() {
        let mut freq = [0u32; MAX_ALPHA_SIZE];
        for (i, f) in freq.iter_mut().take(50).enumerate() {
            *f = (50 - i) as u32 * 10;
        }
        let eob = 49u16;
        for table_count in 2..=6 {
            let tables = init_tables(&freq, table_count, eob);
            for sym in 0..=eob as usize {
                let owners = (0..table_count)
                    .filter(|&t| tables[t][sym] == 0)
                    .count();
                assert_eq!(owners, 1, "symbol {} with {} tables", sym, table_count);
            }
        }
    }

    #[test]
    fn encodes_without_panicking_across_sizes() {
        for size in [1usize, 10, 199, 200, 601, 2500, 10_000] {
            let data: Vec<u8> = (0..size).map(|i| (i * 7 % 64) as u8).collect();
            let (rle2, freq, sym_map) = rle2_mtf_encode(&data);
            let eob = rle2[rle2.len() - 1];
            let mut log = BitLog::new();
            huf_encode(&mut log, &rle2, &freq, &sym_map, eob, 4);
        }
    }

    #[test]
    fn selector_count_matches_group_count() {
        // Exactly 50 symbols is one group, 51 is two
        assert_eq!(100usize.div_ceil(GROUP_SIZE), 2);
        assert_eq!(101usize.div_ceil(GROUP_SIZE), 3);
        assert_eq!(50usize.div_ceil(GROUP_SIZE), 1);
    }
}
