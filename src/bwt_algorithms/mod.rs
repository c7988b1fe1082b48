//! The bwt_algorithms module is the sorting subsystem of the compressor.
//!
//! The Burrows-Wheeler Transform rewrites a block as the last column of its
//! sorted cyclic rotations, which herds identical bytes together and sets up
//! the move-to-front stage. The sort is where the compressor spends most of
//! its time, and no single algorithm wins on all data: ordinary text sorts
//! quickly under direct rotation comparison, while highly repetitive data
//! makes those comparisons walk nearly the whole block. This module holds
//! both a comparison sort for the common case and a rank-doubling sort whose
//! cost does not depend on the data, with a cheap probe to pick between them.

pub mod bwt_sort;
pub mod rank_doubling;
