//! The compression module holds both directions of the run length codec and the worker group that
//! splits an input file among several encoders.
//!
//! Compression happens in the following steps:
//! - Partition: the coordinator measures the input and hands each worker a contiguous chunk.
//! - Key iteration: each chunk is read as fixed width keys, MSB first, the last key zero padded.
//! - Run detection: consecutive equal keys collapse into one key and one run count.
//! - Packing: keys go to the .data record at the key width, counts go to the .meta record at the
//!   narrowest width that holds the largest count.
//!
//! Decompression reads one fragment's record pair and writes every key back out `count` times.
//! Fragments are independent; joining them in rank order restores the input.

pub mod compress;
pub mod compress_fragment;
pub mod container;
pub mod decompress;
pub mod partition;
