//! Helpers shared by the codec and the front end.
//!
//! The tools are:
//! - cli: Command line interface and the options it produces.
//! - run_counts: The run count sequence and the bit width it needs.
//!
pub mod cli;
pub mod run_counts;
