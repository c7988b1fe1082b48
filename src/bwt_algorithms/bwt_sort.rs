//! Burrows-Wheeler-Transform entry point: probes the data, sorts the cyclic
//! rotations with whichever algorithm suits it, and builds the transformed
//! block plus the 24-bit key the block header carries.

use std::cmp::Ordering;
use std::collections::HashSet;

use log::debug;
use rayon::prelude::*;

use super::rank_doubling::rank_doubling_sort;
use crate::tools::freq_count::freqs;

/// Block length above which the rotation sort runs on the rayon pool.
const PAR_SORT_MIN: usize = 40_000;

/// Block length below which the rank-doubling sort always wins; comparison
/// sorting has nothing to gain on blocks this small.
const SMALL_BLOCK: usize = 3_000;

/// Compute the BWT of one block. Returns the key (the sorted position of the
/// unrotated block) and the last-column data.
pub fn bwt_encode(data: &[u8]) -> (u32, Vec<u8>) {
    if data.len() < 2 {
        return (0, data.to_vec());
    }

    let index = if data.len() < SMALL_BLOCK || prefers_doubling(data) {
        debug!("block sort: rank doubling, {} bytes", data.len());
        rank_doubling_sort(data)
    } else {
        debug!("block sort: rotation comparison, {} bytes", data.len());
        rotation_sort(data)
    };

    // The last column of the sorted rotation matrix: the byte before each
    // rotation's starting offset. The key marks where rotation 0 landed.
    let mut key = 0_u32;
    let mut bwt = vec![0_u8; data.len()];
    for (i, &idx) in index.iter().enumerate() {
        if idx == 0 {
            key = i as u32;
            bwt[i] = data[data.len() - 1];
        } else {
            bwt[i] = data[idx as usize - 1];
        }
    }
    (key, bwt)
}

/// Sort the rotation offsets by direct comparison of the rotations.
fn rotation_sort(data: &[u8]) -> Vec<u32> {
    let mut index = (0_u32..data.len() as u32).collect::<Vec<u32>>();
    if data.len() > PAR_SORT_MIN {
        index.par_sort_unstable_by(|&a, &b| rotation_cmp(a as usize, b as usize, data));
    } else {
        index.sort_unstable_by(|&a, &b| rotation_cmp(a as usize, b as usize, data));
    }
    index
}

/// Lexicographic comparison of the rotations starting at `a` and `b`,
/// with equal rotations ordered by offset.
fn rotation_cmp(a: usize, b: usize, block: &[u8]) -> Ordering {
    let n = block.len();
    // Both rotations run unwrapped for this many bytes; compare those as
    // straight slices before falling back to the wrapped remainders.
    let straight = n - a.max(b);
    block[a..a + straight]
        .cmp(&block[b..b + straight])
        .then_with(|| {
            let rest_a = block[a + straight..].iter().chain(&block[..a]);
            let rest_b = block[b + straight..].iter().chain(&block[..b]);
            rest_a.cmp(rest_b).then(a.cmp(&b))
        })
}

/// Decide whether the rank-doubling sort should handle this block, from a
/// sample off the front: a tiny alphabet, a dominant byte, long runs, or
/// few distinct 8-byte windows all mean rotation comparisons will walk
/// deep into the block.
fn prefers_doubling(data: &[u8]) -> bool {
    let sample = &data[..5_000.min(data.len())];
    let freq = freqs(sample);
    let distinct = freq.iter().filter(|&&f| f != 0).count();
    let max_freq = *freq.iter().max().unwrap() as usize;
    if distinct < 20 || max_freq * 10 >= sample.len() * 3 {
        return true;
    }

    let mut longest = 0;
    let mut run = 0;
    for pair in sample.windows(2) {
        if pair[0] == pair[1] {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    if longest * 10 > sample.len() * 2 {
        return true;
    }

    // Periodic data keeps a normal alphabet but repeats whole substrings;
    // that shows up as very few distinct fixed-width windows
    let mut windows = HashSet::new();
    for w in sample.windows(8) {
        windows.insert(u64::from_be_bytes(w.try_into().unwrap()));
    }
    windows.len() * 4 < sample.len() - 7
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn banana_known_answer() {
        // Sorted rotations of "banana": abanan, anaban, ananab, banana,
        // nabana, nanaba; last column "nnbaaa", original row at 3.
        let (key, bwt) = bwt_encode(b"banana");
        assert_eq!(key, 3);
        assert_eq!(bwt, b"nnbaaa");
    }

    #[test]
    fn single_byte_block() {
        let (key, bwt) = bwt_encode(&[0x00]);
        assert_eq!(key, 0);
        assert_eq!(bwt, vec![0x00]);
    }

    #[test]
    fn uniform_block_is_fixed_point() {
        let (key, bwt) = bwt_encode(&[7u8; 64]);
        assert_eq!(key, 0);
        assert_eq!(bwt, vec![7u8; 64]);
    }

    #[test]
    fn sorts_agree_on_mixed_data() {
        let mut data = Vec::with_capacity(4_096);
        let mut x = 0x2545F491_u32;
        for _ in 0..4_096 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            data.push((x >> 24) as u8);
        }
        let direct = rotation_sort(&data);
        let doubled = rank_doubling_sort(&data);
        assert_eq!(direct, doubled);
    }

    #[test]
    fn sorts_agree_on_repetitive_data() {
        let data = b"abcabcabcabcab".repeat(40);
        let direct = rotation_sort(&data);
        let doubled = rank_doubling_sort(&data);
        assert_eq!(direct, doubled);
    }

    #[test]
    fn probe_flags_repetitive_data() {
        assert!(prefers_doubling(&[b'a'; 8_000]));
        // A repeated sentence has a healthy alphabet but few distinct windows
        let sentence = b"the quick brown fox jumps over the lazy dog\n".repeat(200);
        assert!(prefers_doubling(&sentence));
        // Noise has plenty of everything
        let mut noise = Vec::with_capacity(8_000);
        let mut x = 0x0001_2345_u32;
        for _ in 0..8_000 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            noise.push(x as u8);
        }
        assert!(!prefers_doubling(&noise));
    }
}
