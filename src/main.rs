//Enable more cargo lint tests
#![warn(rust_2018_idioms)]
#![warn(clippy::disallowed_types)]

use keyrle::compression::compress::compress;
use keyrle::compression::decompress::decompress;
use keyrle::error::RleError;
use keyrle::tools::cli::{rleopts_init, Mode};

use log::{error, info, LevelFilter};
use simplelog::{Config, TermLogger, TerminalMode};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn main() {
    // Available log levels are Error, Warn, Info, Debug, Trace
    if let Err(e) = TermLogger::init(
        LevelFilter::Trace,
        Config::default(),
        TerminalMode::Stdout,
        simplelog::ColorChoice::Auto,
    ) {
        eprintln!("Could not start the logger: {}", e);
    }

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(e.class().exit_code());
    }
    info!("Done.\n");
}

//----- Figure out what we need to do and go do it
fn run() -> Result<(), RleError> {
    let options = rleopts_init()?;
    match &options.op_mode {
        Mode::Compress(opts) => {
            let summaries = compress(opts)?;
            let runs: u64 = summaries.iter().map(|s| s.runs).sum();
            let written: u64 = summaries
                .iter()
                .map(|s| s.data_bytes() + s.meta_bytes())
                .sum();
            info!(
                "Wrote {} fragment(s): {} runs in {} bytes.",
                summaries.len(),
                runs,
                written
            );
        }
        Mode::Decompress(opts) => {
            let summary = decompress(opts)?;
            if !summary.verified {
                info!("No checksum in this fragment, output was not verified.");
            }
        }
    }
    Ok(())
}
