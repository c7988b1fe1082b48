//! Rank-doubling rotation sort.
//!
//! Sorts the cyclic rotations of a block in O(n log^2 n) no matter what the
//! data looks like. Each round sorts the offsets by a pair of ranks covering
//! twice the span of the previous round, so k rounds order every rotation by
//! its first 2^k bytes. Repetitive data that would drive the direct
//! comparison sort quadratic costs the same here as anything else.

use rayon::prelude::*;

/// Offsets count above which the per-round sorts run on the rayon pool.
const PAR_SORT_MIN: usize = 40_000;

/// Sort the rotation offsets of `data`. Equal rotations (a periodic block)
/// come out ordered by offset.
pub fn rank_doubling_sort(data: &[u8]) -> Vec<u32> {
    let n = data.len();
    let mut index = (0_u32..n as u32).collect::<Vec<u32>>();
    if n < 2 {
        return index;
    }

    // Round zero ranks are the bytes themselves.
    let mut rank: Vec<u32> = data.iter().map(|&b| b as u32).collect();
    let mut key: Vec<u64> = vec![0; n];

    let mut span = 1_usize;
    while span < n {
        // Key: this rotation's rank, then the rank one span further along.
        for (i, slot) in key.iter_mut().enumerate() {
            let next = if i + span >= n { i + span - n } else { i + span };
            *slot = ((rank[i] as u64) << 32) | rank[next] as u64;
        }

        if n > PAR_SORT_MIN {
            index.par_sort_unstable_by_key(|&i| key[i as usize]);
        } else {
            index.sort_unstable_by_key(|&i| key[i as usize]);
        }

        // Re-rank: equal keys share a rank so the next round can extend them.
        let mut next_rank = vec![0_u32; n];
        let mut r = 0_u32;
        for pair in index.windows(2) {
            if key[pair[1] as usize] != key[pair[0] as usize] {
                r += 1;
            }
            next_rank[pair[1] as usize] = r;
        }
        rank = next_rank;

        // All rotations distinct; the order is final.
        if r as usize == n - 1 {
            return index;
        }
        span <<= 1;
    }

    // The block is periodic: some full rotations compare equal. Settle the
    // remaining ties by offset.
    if n > PAR_SORT_MIN {
        index.par_sort_unstable_by_key(|&i| ((rank[i as usize] as u64) << 32) | i as u64);
    } else {
        index.sort_unstable_by_key(|&i| ((rank[i as usize] as u64) << 32) | i as u64);
    }
    index
}

#[cfg(test)]
mod test {
    use super::*;

    fn rotation(data: &[u8], start: usize) -> Vec<u8> {
        let mut r = data[start..].to_vec();
        r.extend_from_slice(&data[..start]);
        r
    }

    #[test]
    fn orders_rotations_lexicographically() {
        let data = b"mississippi";
        let index = rank_doubling_sort(data);
        for pair in index.windows(2) {
            let a = rotation(data, pair[0] as usize);
            let b = rotation(data, pair[1] as usize);
            assert!(a < b, "{:?} should sort before {:?}", a, b);
        }
    }

    #[test]
    fn periodic_block_ties_break_by_offset() {
        // "abab" rotations: abab(0), baba(1), abab(2), baba(3); equal
        // rotations keep offset order.
        let index = rank_doubling_sort(b"abab");
        assert_eq!(index, vec![0, 2, 1, 3]);
    }

    #[test]
    fn uniform_block_is_identity() {
        let index = rank_doubling_sort(&[9u8; 17]);
        assert_eq!(index, (0..17).collect::<Vec<u32>>());
    }

    #[test]
    fn empty_and_single() {
        assert_eq!(rank_doubling_sort(&[]), Vec::<u32>::new());
        assert_eq!(rank_doubling_sort(&[42]), vec![0]);
    }
}
