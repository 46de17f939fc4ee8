//! Layout of a fragment: the .data/.meta record pair written by one worker.
//!
//! .data: `key_width:u8`, then one `key_width` bit key per run, MSB first, zero padded to a byte.
//!
//! .meta: `producers:u8`, `num_runs:u48` (big-endian), `run_width:u8`, then one `run_width` bit
//! count per run, zero padded to a byte, then the trailer: `tail_padding:u8` and a big-endian
//! CRC-32 of the worker's input. A run count of 0 is reserved as the escape marker.

use std::ffi::OsString;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::trace;

use crate::bitstream::bitreader::BitReader;
use crate::bitstream::bitwriter::BitWriter;
use crate::error::{FormatError, RleError};

pub const MIN_WIDTH: u8 = 1;
pub const MAX_WIDTH: u8 = 64;
/// Widths of the header fields, in bits.
pub const TAG_BITS: u8 = 8;
pub const NUM_RUNS_BITS: u8 = 48;
pub const CHECKSUM_BITS: u8 = 32;
pub const MAX_RUNS: u64 = (1 << NUM_RUNS_BITS) - 1;
/// Largest group a fragment can record as its producer count.
pub const MAX_PRODUCERS: usize = u8::MAX as usize;
/// Run count that introduces a stretch of literal keys.
pub const ESCAPE_RUN: u64 = 0;

pub const DATA_HEADER_LEN: u64 = 1;
pub const META_HEADER_LEN: u64 = 8;
pub const META_TRAILER_LEN: u64 = 5;

pub const DATA_EXT: &str = ".data";
pub const META_EXT: &str = ".meta";

/// Parse a key size argument. Anything that is not a plain decimal in [1, 64] is rejected.
pub fn parse_key_width(arg: &str) -> Result<u8, RleError> {
    match arg.parse::<u8>() {
        Ok(width) if (MIN_WIDTH..=MAX_WIDTH).contains(&width) => Ok(width),
        _ => Err(RleError::InvalidKeyWidth(arg.to_string())),
    }
}

/// Turn an EOF from the bit reader into a truncation error naming the field being read.
pub(crate) fn truncated(field: &'static str) -> impl Fn(io::Error) -> RleError {
    move |e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            FormatError::Truncated(field).into()
        } else {
            e.into()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub key_width: u8,
}

impl DataHeader {
    pub fn write_to<W: Write>(&self, writer: W) -> io::Result<W> {
        let mut bw = BitWriter::new(writer);
        bw.write(TAG_BITS, self.key_width as u64)?;
        bw.finish()
    }

    pub fn read_from<R: Read>(br: &mut BitReader<R>) -> Result<Self, RleError> {
        let key_width = br.read(TAG_BITS).map_err(truncated("data header"))? as u8;
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&key_width) {
            return Err(FormatError::InvalidKeyWidth(key_width).into());
        }
        Ok(Self { key_width })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaHeader {
    pub producers: u8,
    pub num_runs: u64,
    pub run_width: u8,
}

impl MetaHeader {
    pub fn write_to<W: Write>(&self, writer: W) -> Result<W, RleError> {
        if self.num_runs > MAX_RUNS {
            return Err(FormatError::TooManyRuns(self.num_runs).into());
        }
        let mut bw = BitWriter::new(writer);
        bw.write(TAG_BITS, self.producers as u64)?;
        bw.write(NUM_RUNS_BITS, self.num_runs)?;
        bw.write(TAG_BITS, self.run_width as u64)?;
        trace!("Meta header ends at {}", bw.loc());
        Ok(bw.finish()?)
    }

    pub fn read_from<R: Read>(br: &mut BitReader<R>) -> Result<Self, RleError> {
        let producers = br.read(TAG_BITS).map_err(truncated("meta header"))? as u8;
        let num_runs = br.read(NUM_RUNS_BITS).map_err(truncated("meta header"))?;
        let run_width = br.read(TAG_BITS).map_err(truncated("meta header"))? as u8;
        if producers == 0 {
            return Err(FormatError::NoProducers.into());
        }
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&run_width) {
            return Err(FormatError::InvalidRunWidth(run_width).into());
        }
        Ok(Self {
            producers,
            num_runs,
            run_width,
        })
    }
}

/// Integrity record after the run counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaTrailer {
    /// Zero bits the encoder added to complete the final key.
    pub tail_padding: u8,
    /// CRC-32 of the bytes the fragment was made from.
    pub checksum: u32,
}

impl MetaTrailer {
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<W> {
        writer.write_all(&[self.tail_padding])?;
        writer.write_all(&self.checksum.to_be_bytes())?;
        writer.flush()?;
        Ok(writer)
    }

    /// Read the trailer that follows the run counts. Fragments written without one end right
    /// after the counts; for those this returns None.
    pub fn read_from<R: Read>(br: &mut BitReader<R>) -> Result<Option<Self>, RleError> {
        br.align();
        trace!("Looking for meta trailer at {}", br.loc());
        let tail_padding = match br.try_byte().map_err(truncated("meta trailer"))? {
            Some(byte) => byte,
            None => return Ok(None),
        };
        let checksum = br.read(CHECKSUM_BITS).map_err(truncated("meta trailer"))? as u32;
        Ok(Some(Self {
            tail_padding,
            checksum,
        }))
    }
}

/// Paths of one fragment's record pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentPaths {
    pub data: PathBuf,
    pub meta: PathBuf,
}

impl FragmentPaths {
    /// `<base>.data` and `<base>.meta`. The extensions are appended, so a base containing dots is
    /// kept whole.
    pub fn from_base(base: &Path) -> Self {
        let with_ext = |ext: &str| {
            let mut name: OsString = base.as_os_str().to_owned();
            name.push(ext);
            PathBuf::from(name)
        };
        Self {
            data: with_ext(DATA_EXT),
            meta: with_ext(META_EXT),
        }
    }

    /// Names for the fragment written by `rank`: the input's file name up to its first dot,
    /// followed by the rank, placed in `output_dir` (or next to the input).
    pub fn for_rank(input: &Path, output_dir: Option<&Path>, rank: usize) -> Self {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name.split('.').next().unwrap_or_default();
        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Self::from_base(&dir.join(format!("{}{}", stem, rank)))
    }
}

/// Both records of a fragment held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub data: Vec<u8>,
    pub meta: Vec<u8>,
}
