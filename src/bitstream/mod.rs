//! The bitstream module is the bit level I/O subsystem of keyrle.
//!
//! Keys and run counts are fixed width fields that rarely line up with byte boundaries, so every
//! piece of the codec goes through one of these:
//! - bititer: read a byte buffer as a sequence of fixed width keys.
//! - bitpacker: write fixed width values, flushing whole 64 bit words.
//! - bitreader / bitwriter: read and write fields of mixed width (headers, run counts, keys when
//!   decoding).
//!
//! All four agree on bit order: MSB first, bytes in stream order.
//!
pub mod bititer;
pub mod bitpacker;
pub mod bitreader;
pub mod bitwriter;
