use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::thread;

use log::{debug, info};

use super::compress_fragment::{write_fragment, FragmentSummary};
use super::container::{FragmentPaths, MAX_PRODUCERS, MAX_WIDTH, MIN_WIDTH};
use super::partition::{chunk_sizes, group, Endpoint, Message, PHASES};
use crate::error::RleError;
use crate::tools::cli::CompressOpts;

/*
    The coordinator opens the input and measures it before any worker starts, so bad arguments and
    missing files never get as far as a thread.

    Every rank then walks the same five phases, each ending at a barrier:
      1. compute its fragment names
      2. learn its chunk size
      3. allocate its buffer
      4. receive its chunk (the coordinator reads and sends every other chunk, then its own)
      5. encode the chunk and write its .data/.meta pair
*/

/// Compress the input file defined in opts (CompressOpts) into one fragment per worker.
/// Summaries come back in rank order.
pub fn compress(opts: &CompressOpts) -> Result<Vec<FragmentSummary>, RleError> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&opts.key_width) {
        return Err(RleError::InvalidKeyWidth(opts.key_width.to_string()));
    }
    if !(1..=MAX_PRODUCERS).contains(&opts.workers) {
        return Err(RleError::InvalidWorkerCount(opts.workers));
    }

    let open_err = |source: std::io::Error| RleError::Open {
        path: opts.input.clone(),
        source,
    };
    let fin = File::open(&opts.input).map_err(open_err)?;
    let file_size = fin.metadata().map_err(open_err)?.len();
    info!(
        "Compressing {} ({} bytes) with {} bit keys on {} worker(s)",
        opts.input.display(),
        file_size,
        opts.key_width,
        opts.workers
    );

    let sizes = chunk_sizes(file_size, opts.workers);
    let mut fin = Some(fin);
    let results: Vec<Result<FragmentSummary, RleError>> = thread::scope(|s| {
        let handles: Vec<_> = group(opts.workers, PHASES)
            .into_iter()
            .map(|ep| {
                let input = if ep.is_coordinator() { fin.take() } else { None };
                let sizes = &sizes;
                s.spawn(move || run_rank(ep, opts, input, sizes))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(RleError::Protocol {
                        rank,
                        reason: "worker panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    // Report the failure that started it, not the ranks that stopped because of it.
    let mut summaries = Vec::with_capacity(results.len());
    let mut aborted = false;
    let mut root_cause = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(RleError::Aborted) => aborted = true,
            Err(e) => match root_cause {
                // The caller reports the root cause; later failures only go to the debug log.
                Some(_) => debug!("Rank {} also failed: {}", rank, e),
                None => root_cause = Some(e),
            },
        }
    }
    if let Some(e) = root_cause {
        return Err(e);
    }
    if aborted {
        return Err(RleError::Aborted);
    }
    Ok(summaries)
}

/// One rank's pass through the phases. The coordinator also gets the open input file.
fn run_rank(
    mut ep: Endpoint,
    opts: &CompressOpts,
    input: Option<File>,
    sizes: &[u64],
) -> Result<FragmentSummary, RleError> {
    let rank = ep.rank();

    let paths = FragmentPaths::for_rank(&opts.input, opts.output_dir.as_deref(), rank);
    debug!("Rank {} will write {}", rank, paths.data.display());
    ep.barrier()?;

    let size = if ep.is_coordinator() {
        for (to, &size) in sizes.iter().enumerate().skip(1) {
            ep.send(to, Message::ChunkSize(size))?;
        }
        sizes[rank]
    } else {
        ep.recv_chunk_size()?
    };
    debug!("Rank {} has a chunk of {} bytes", rank, size);
    ep.barrier()?;

    let mut buf = allocate(rank, size)?;
    debug!("Rank {} allocated {} bytes", rank, buf.capacity());
    ep.barrier()?;

    if ep.is_coordinator() {
        let mut fin = input.ok_or_else(|| RleError::Protocol {
            rank,
            reason: "coordinator has no input file".to_string(),
        })?;
        fin.seek(SeekFrom::Start(size))?;
        for (to, &chunk_size) in sizes.iter().enumerate().skip(1) {
            let mut chunk = allocate(rank, chunk_size)?;
            read_chunk(&mut fin, chunk_size, &mut chunk)?;
            ep.send(to, Message::Chunk(chunk))?;
            debug!("Sent {} bytes to rank {}", chunk_size, to);
        }
        fin.seek(SeekFrom::Start(0))?;
        read_chunk(&mut fin, size, &mut buf)?;
    } else {
        buf = adopt_chunk(rank, size, buf, ep.recv_chunk()?)?;
    }
    debug!("Rank {} holds its {} bytes", rank, buf.len());
    ep.barrier()?;

    // MAX_PRODUCERS caps the group size, so this always fits.
    let producers = ep.size().min(MAX_PRODUCERS) as u8;
    let summary = write_fragment(&buf, opts.key_width, producers, &paths)?;
    info!(
        "Rank {}: {} runs, max count {}, {} bit counts",
        rank, summary.runs, summary.max_count, summary.run_width
    );
    ep.barrier()?;

    ep.finish();
    Ok(summary)
}

/// An empty buffer with room for `size` bytes, or an allocation error instead of an abort.
fn allocate(rank: usize, size: u64) -> Result<Vec<u8>, RleError> {
    let len = usize::try_from(size).map_err(|_| RleError::Allocation {
        rank,
        size: usize::MAX,
    })?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| RleError::Allocation { rank, size: len })?;
    Ok(buf)
}

/// Take over the received chunk as this rank's buffer. The reservation made while the group was
/// allocating is released in its place, so the bytes are never held twice.
fn adopt_chunk(
    rank: usize,
    size: u64,
    reserved: Vec<u8>,
    chunk: Vec<u8>,
) -> Result<Vec<u8>, RleError> {
    if chunk.len() as u64 != size {
        return Err(RleError::Protocol {
            rank,
            reason: format!("announced {} bytes, received {}", size, chunk.len()),
        });
    }
    drop(reserved);
    Ok(chunk)
}

/// Append exactly `size` bytes from the file's current position.
fn read_chunk(fin: &mut File, size: u64, buf: &mut Vec<u8>) -> Result<(), RleError> {
    let actual = fin.by_ref().take(size).read_to_end(buf)?;
    if actual as u64 != size {
        return Err(RleError::ShortRead {
            expected: size as usize,
            actual,
        });
    }
    Ok(())
}
