//! Byte frequency counting over a block of data.
//!
//! Returns an array of 256 u32 counts. Large blocks are split one chunk per
//! rayon pool thread and the partial tables summed at the end; counting is
//! memory bound, so splitting finer than the thread count only multiplies
//! the number of partial tables to merge.

use rayon::prelude::*;

/// Below this length the split-and-merge overhead outweighs the counting.
const PAR_MIN: usize = 32 * 1024;

fn count(chunk: &[u8]) -> [u32; 256] {
    let mut freqs = [0_u32; 256];
    for &byte in chunk {
        freqs[byte as usize] += 1;
    }
    freqs
}

/// Returns a frequency count of the input data.
pub fn freqs(data: &[u8]) -> [u32; 256] {
    if data.len() < PAR_MIN {
        return count(data);
    }
    let chunk_len = data.len().div_ceil(rayon::current_num_threads().max(1));
    data.par_chunks(chunk_len).map(count).reduce(
        || [0_u32; 256],
        |mut acc, partial| {
            for (a, b) in acc.iter_mut().zip(&partial) {
                *a += b;
            }
            acc
        },
    )
}
