use std::path::PathBuf;
use std::process::exit;
use std::{fmt::Display, fmt::Formatter};

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

use crate::compression::container::{parse_key_width, MAX_PRODUCERS};
use crate::error::RleError;

/// Verbosity of user information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Errors,
    Warnings,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    /// -v0 is silent, -v5 (or more) is chatty
    pub fn from_level(v: u8) -> Self {
        match v {
            0 => Verbosity::Quiet,
            1 => Verbosity::Errors,
            2 => Verbosity::Warnings,
            3 => Verbosity::Info,
            4 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }

    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Off,
            Verbosity::Errors => LevelFilter::Error,
            Verbosity::Warnings => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
            Verbosity::Trace => LevelFilter::Trace,
        }
    }
}

/// Settings for splitting and encoding one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressOpts {
    /// File to read for input
    pub input: PathBuf,
    /// Bits per key, 1..=64
    pub key_width: u8,
    /// Size of the worker group, 1..=255
    pub workers: usize,
    /// Where fragments go. None puts them next to the input.
    pub output_dir: Option<PathBuf>,
}

/// Settings for decoding one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressOpts {
    /// Fragment path without the .data/.meta extension
    pub fragment_base: PathBuf,
    /// File to write the decoded bytes to
    pub output: PathBuf,
}

/// Compress or Decompress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Compress(CompressOpts),
    Decompress(DecompressOpts),
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Compress(_) => write!(f, "Compress"),
            Mode::Decompress(_) => write!(f, "Decompress"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RleOpts {
    /// Compress/Decompress, with the settings for each
    pub op_mode: Mode,
    /// Verbosity of user information
    pub verbose: Verbosity,
}

/// Command Line Interpretation - uses external CLAP crate.
#[derive(Parser, Debug)]
#[clap(
    version,
    about = "Run length encoding of fixed width bit keys",
    long_about = "
    The input is read as a stream of keys of 1 to 64 bits. Every run of identical keys is stored
    as one key in a .data file and one run count in a .meta file.

    Compression splits the input among a group of workers; each worker writes its own fragment,
    and decompression restores one fragment at a time."
)]
pub struct Args {
    /// Sets verbosity. -v0 is silent, -v5 is chatty
    #[clap(short = 'v', default_value_t = 3, global = true)]
    v: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a file among workers and write one .data/.meta fragment per worker
    Compress {
        /// File to compress
        input: PathBuf,
        /// Bits per key, 1..=64
        key_size: String,
        /// Number of workers, 1..=255
        #[clap(short = 'n', long = "workers", default_value_t = 1)]
        workers: usize,
        /// Directory for the fragments, defaults to the input's directory
        #[clap(short = 'o', long = "output-dir")]
        output_dir: Option<PathBuf>,
    },
    /// Restore the bytes of one fragment
    Decompress {
        /// Fragment path without the .data/.meta extension
        fragment_base: PathBuf,
        /// File to write
        output: PathBuf,
    },
}

impl RleOpts {
    /// Check the parsed arguments and put them into our internal structure.
    pub fn from_args(args: Args) -> Result<Self, RleError> {
        let op_mode = match args.command {
            Command::Compress {
                input,
                key_size,
                workers,
                output_dir,
            } => {
                let key_width = parse_key_width(&key_size)?;
                if !(1..=MAX_PRODUCERS).contains(&workers) {
                    return Err(RleError::InvalidWorkerCount(workers));
                }
                Mode::Compress(CompressOpts {
                    input,
                    key_width,
                    workers,
                    output_dir,
                })
            }
            Command::Decompress {
                fragment_base,
                output,
            } => Mode::Decompress(DecompressOpts {
                fragment_base,
                output,
            }),
        };
        Ok(Self {
            op_mode,
            verbose: Verbosity::from_level(args.v),
        })
    }
}

/// Parse the command line, set the log level and report what we are about to do.
/// Usage errors (and --help/--version) end the process here.
pub fn rleopts_init() -> Result<RleOpts, RleError> {
    let args = Args::try_parse().unwrap_or_else(|e| {
        let code = if e.use_stderr() { 1 } else { 0 };
        // Nothing more to report if the terminal is gone.
        let _ = e.print();
        exit(code)
    });
    let opts = RleOpts::from_args(args)?;

    // Set the log level
    log::set_max_level(opts.verbose.level_filter());

    // Below we report initialization status to the user
    info!("---- keyrle Initialization Start ----");
    info!("Verbosity set to {}", log::max_level());
    info!("Operational mode set to {}", opts.op_mode);
    match &opts.op_mode {
        Mode::Compress(c) => {
            info!("Getting input from the file {}", c.input.display());
            info!("Key size set to {} bits", c.key_width);
            info!("Worker count set to {}", c.workers);
            if let Some(dir) = &c.output_dir {
                info!("Writing fragments to {}", dir.display())
            }
        }
        Mode::Decompress(d) => {
            info!("Reading fragment {}", d.fragment_base.display());
            info!("Writing output to {}", d.output.display());
        }
    }
    info!("---- keyrle Initialization End ----\n");
    Ok(opts)
}
