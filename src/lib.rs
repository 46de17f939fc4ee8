//! Run length encoding of fixed width bit keys.
//!
//! Version 0.1.0
//!
//! An input is read as a stream of keys between 1 and 64 bits wide. Each run of identical
//! consecutive keys is stored once: the key goes to a `.data` record and the run length to a
//! `.meta` record, with the run lengths packed at the fewest bits that hold the longest run.
//!
//! Compression can split one file among a group of workers, each writing its own fragment.
//! Decompression restores one fragment at a time.
//!
//! Basic usage to compress a file with 8 bit keys on four workers is as follows:
//!
//! `$> keyrle compress test.txt 8 -n 4`
//!
//! This creates test0.data/test0.meta through test3.data/test3.meta next to test.txt.
//! `$> keyrle decompress test2 part2` restores the third quarter of the file.
//!
pub mod bitstream;
pub mod compression;
pub mod error;
pub mod tools;
