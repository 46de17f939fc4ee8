use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

use log::{debug, info, trace, warn};

use crate::bitstream::bitreader::BitReader;
use crate::bitstream::bitwriter::BitWriter;
use crate::compression::container::{
    truncated, DataHeader, Fragment, FragmentPaths, MetaHeader, MetaTrailer, ESCAPE_RUN,
};
use crate::error::{FormatError, RleError};
use crate::tools::cli::DecompressOpts;

/// What a decode pass found and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSummary {
    pub producers: u8,
    pub runs: u64,
    pub run_width: u8,
    pub key_width: u8,
    pub keys: u64,
    pub bytes_out: u64,
    /// False for fragments without a trailer, which carry no checksum.
    pub verified: bool,
}

/// Output sink that hashes everything written through it.
struct HashingWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes keys back out, always holding the latest one back. The final key of a fragment may
/// carry padding bits that must not reach the output, and that is only known from the trailer.
struct KeyExpander<W: Write> {
    out: BitWriter<HashingWriter<W>>,
    key_width: u8,
    pending: Option<u64>,
    keys: u64,
}

impl<W: Write> KeyExpander<W> {
    fn new(sink: W, key_width: u8) -> Self {
        Self {
            out: BitWriter::new(HashingWriter {
                inner: sink,
                hasher: crc32fast::Hasher::new(),
                written: 0,
            }),
            key_width,
            pending: None,
            keys: 0,
        }
    }

    /// Emit `key` `times` times in a row.
    fn emit(&mut self, key: u64, times: u64) -> io::Result<()> {
        if times == 0 {
            return Ok(());
        }
        if let Some(held) = self.pending.take() {
            self.out.write(self.key_width, held)?;
        }
        for _ in 1..times {
            self.out.write(self.key_width, key)?;
        }
        self.pending = Some(key);
        self.keys += times;
        Ok(())
    }

    /// Write the held key without its last `padding` bits, flush, and return the sink along with
    /// the CRC-32 of everything written.
    fn finish(mut self, padding: u8) -> Result<(W, u32, u64), RleError> {
        match self.pending.take() {
            Some(held) => {
                if padding >= self.key_width {
                    return Err(FormatError::PaddingOutOfRange {
                        padding,
                        key_width: self.key_width,
                    }
                    .into());
                }
                self.out.write(self.key_width - padding, held >> padding)?;
            }
            None if padding > 0 => {
                return Err(FormatError::PaddingOutOfRange {
                    padding,
                    key_width: self.key_width,
                }
                .into());
            }
            None => {}
        }
        trace!("Output ends at {}", self.out.loc());
        let hashing = self.out.finish()?;
        Ok((hashing.inner, hashing.hasher.finalize(), hashing.written))
    }
}

/// Rebuild the bytes a fragment was made from. Reads the .meta and .data records in step and
/// writes the expanded key stream to `out`.
pub fn decode_fragment<M: Read, D: Read, W: Write>(
    meta: M,
    data: D,
    out: W,
) -> Result<(W, DecodeSummary), RleError> {
    let mut meta = BitReader::new(meta);
    let mut data = BitReader::new(data);

    let header = MetaHeader::read_from(&mut meta)?;
    let key_width = DataHeader::read_from(&mut data)?.key_width;
    info!(
        "numRuns: {} | runLen: {} | keyLen: {} | producers: {}",
        header.num_runs, header.run_width, key_width, header.producers
    );

    let mut expander = KeyExpander::new(out, key_width);
    for _ in 0..header.num_runs {
        let run = meta.read(header.run_width).map_err(truncated("run counts"))?;
        if run == ESCAPE_RUN {
            // A stretch of keys that each appear once.
            let literals = meta.read(header.run_width).map_err(truncated("run counts"))?;
            for _ in 0..literals {
                let key = data.read(key_width).map_err(truncated("keys"))?;
                expander.emit(key, 1)?;
            }
        } else {
            let key = data.read(key_width).map_err(truncated("keys"))?;
            expander.emit(key, run)?;
        }
    }
    let keys = expander.keys;

    let trailer = MetaTrailer::read_from(&mut meta)?;
    if trailer.is_none() {
        warn!("Fragment has no trailer; output length and checksum cannot be verified.");
    }
    let padding = trailer.map_or(0, |t| t.tail_padding);
    let (out, checksum, bytes_out) = expander.finish(padding)?;

    if let Some(trailer) = trailer {
        if trailer.checksum != checksum {
            return Err(FormatError::ChecksumMismatch {
                expected: trailer.checksum,
                actual: checksum,
            }
            .into());
        }
        debug!("Checksum {:#010x} verified.", checksum);
    }

    Ok((
        out,
        DecodeSummary {
            producers: header.producers,
            runs: header.num_runs,
            run_width: header.run_width,
            key_width,
            keys,
            bytes_out,
            verified: trailer.is_some(),
        },
    ))
}

/// Decode an in-memory fragment.
pub fn decompress_fragment(fragment: &Fragment) -> Result<Vec<u8>, RleError> {
    let (out, _) = decode_fragment(
        fragment.meta.as_slice(),
        fragment.data.as_slice(),
        Vec::new(),
    )?;
    Ok(out)
}

/// Decompress the fragment named in opts (DecompressOpts) into the output file.
pub fn decompress(opts: &DecompressOpts) -> Result<DecodeSummary, RleError> {
    let paths = FragmentPaths::from_base(&opts.fragment_base);
    let open = |path: &std::path::Path| {
        File::open(path).map_err(|source| RleError::Open {
            path: path.to_path_buf(),
            source,
        })
    };
    let data = open(&paths.data)?;
    let meta = open(&paths.meta)?;
    let out = File::create(&opts.output).map_err(|source| RleError::Create {
        path: opts.output.clone(),
        source,
    })?;

    let (mut out, summary) = decode_fragment(meta, data, BufWriter::new(out))?;
    out.flush()?;
    info!(
        "Wrote {} bytes to {}.",
        summary.bytes_out,
        opts.output.display()
    );
    if summary.producers > 1 {
        info!(
            "This fragment is one of {} produced from the same input.",
            summary.producers
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitstream::bitpacker::BitPacker;
    use crate::compression::compress_fragment::compress_to_fragment;
    use proptest::prelude::*;

    fn round_trip(input: &[u8], key_width: u8) -> Vec<u8> {
        let (fragment, _) = compress_to_fragment(input, key_width, 1).unwrap();
        decompress_fragment(&fragment).unwrap()
    }

    /// Build a fragment by hand, without a trailer, from raw counts and keys.
    fn legacy_fragment(key_width: u8, run_width: u8, counts: &[u64], keys: &[u64], runs: u64) -> Fragment {
        let meta = MetaHeader {
            producers: 1,
            num_runs: runs,
            run_width,
        }
        .write_to(Vec::new())
        .unwrap();
        let mut packer = BitPacker::new(meta, run_width);
        for &c in counts {
            packer.push(c).unwrap();
        }
        let meta = packer.finish().unwrap();

        let data = DataHeader { key_width }.write_to(Vec::new()).unwrap();
        let mut packer = BitPacker::new(data, key_width);
        for &k in keys {
            packer.push(k).unwrap();
        }
        let data = packer.finish().unwrap();
        Fragment { data, meta }
    }

    #[test]
    fn worked_example_round_trip() {
        let input = [0xFF, 0xFF, 0x00, 0x00, 0xAB];
        let (fragment, _) = compress_to_fragment(&input, 8, 1).unwrap();
        let (out, summary) =
            decode_fragment(fragment.meta.as_slice(), fragment.data.as_slice(), Vec::new())
                .unwrap();
        assert_eq!(out, input.to_vec());
        assert_eq!(summary.runs, 3);
        assert_eq!(summary.run_width, 2);
        assert_eq!(summary.keys, 5);
        assert_eq!(summary.bytes_out, 5);
        assert!(summary.verified);
    }

    #[test]
    fn every_key_width_round_trips() {
        let input: Vec<u8> = (0..37_u32).map(|i| (i * i % 7) as u8 * 40).collect();
        for key_width in 1..=64 {
            assert_eq!(round_trip(&input, key_width), input, "key width {}", key_width);
        }
    }

    #[test]
    fn widths_that_leave_padding() {
        assert_eq!(round_trip(&[1, 2, 3, 4, 5], 64), vec![1, 2, 3, 4, 5]);
        assert_eq!(round_trip(&[0xFF], 3), vec![0xFF]);
        assert_eq!(round_trip(&[0, 0, 0], 7), vec![0, 0, 0]);
        assert_eq!(round_trip(&[], 13), Vec::<u8>::new());
    }

    #[test]
    fn escape_runs_emit_literals() {
        // Counts: run of 3 x key A, then escape with 2 literals B C, then run of 1 x key D.
        let fragment = legacy_fragment(8, 2, &[3, 0, 2, 1], &[0xA, 0xB, 0xC, 0xD], 3);
        let out = decompress_fragment(&fragment).unwrap();
        assert_eq!(out, vec![0xA, 0xA, 0xA, 0xB, 0xC, 0xD]);
    }

    #[test]
    fn legacy_fragment_is_not_verified() {
        let fragment = legacy_fragment(8, 2, &[2, 1], &[0x61, 0x62], 2);
        let (out, summary) =
            decode_fragment(fragment.meta.as_slice(), fragment.data.as_slice(), Vec::new())
                .unwrap();
        assert_eq!(out, b"aab".to_vec());
        assert!(!summary.verified);
    }

    #[test]
    fn corrupted_key_fails_checksum() {
        let (mut fragment, _) = compress_to_fragment(b"hello hello", 8, 1).unwrap();
        fragment.data[2] ^= 0x01;
        assert!(matches!(
            decompress_fragment(&fragment),
            Err(RleError::Format(FormatError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn truncated_data_is_reported() {
        let (mut fragment, _) = compress_to_fragment(b"abcdef", 8, 1).unwrap();
        fragment.data.truncate(3);
        assert!(matches!(
            decompress_fragment(&fragment),
            Err(RleError::Format(FormatError::Truncated("keys")))
        ));
    }

    #[test]
    fn truncated_meta_is_reported() {
        let (mut fragment, _) = compress_to_fragment(b"abcdefgh", 8, 1).unwrap();
        fragment.meta.truncate(8);
        assert!(matches!(
            decompress_fragment(&fragment),
            Err(RleError::Format(FormatError::Truncated("run counts")))
        ));
    }

    #[test]
    fn padding_wider_than_key_is_rejected() {
        let (mut fragment, _) = compress_to_fragment(b"zz", 4, 1).unwrap();
        let pad_at = fragment.meta.len() - 5;
        fragment.meta[pad_at] = 4;
        assert!(matches!(
            decompress_fragment(&fragment),
            Err(RleError::Format(FormatError::PaddingOutOfRange { padding: 4, key_width: 4 }))
        ));
    }

    #[test]
    fn padding_without_runs_is_rejected() {
        let (mut fragment, _) = compress_to_fragment(&[], 8, 1).unwrap();
        let pad_at = fragment.meta.len() - 5;
        fragment.meta[pad_at] = 1;
        assert!(matches!(
            decompress_fragment(&fragment),
            Err(RleError::Format(FormatError::PaddingOutOfRange { padding: 1, key_width: 8 }))
        ));
    }

    #[test]
    fn decompress_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("sample0");
        let paths = FragmentPaths::from_base(&base);
        let input = b"mississippi river".to_vec();
        let (fragment, _) = compress_to_fragment(&input, 5, 1).unwrap();
        std::fs::write(&paths.data, &fragment.data).unwrap();
        std::fs::write(&paths.meta, &fragment.meta).unwrap();

        let opts = DecompressOpts {
            fragment_base: base,
            output: dir.path().join("sample.out"),
        };
        let summary = decompress(&opts).unwrap();
        assert_eq!(std::fs::read(&opts.output).unwrap(), input);
        assert_eq!(summary.bytes_out, input.len() as u64);
    }

    #[test]
    fn missing_fragment_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let opts = DecompressOpts {
            fragment_base: dir.path().join("absent"),
            output: dir.path().join("out"),
        };
        assert!(matches!(decompress(&opts), Err(RleError::Open { .. })));
    }

    proptest! {
        #[test]
        fn any_buffer_any_width(input in proptest::collection::vec(any::<u8>(), 0..300), key_width in 1_u8..=64) {
            prop_assert_eq!(round_trip(&input, key_width), input);
        }

        #[test]
        fn runny_buffers(runs in proptest::collection::vec((any::<u8>(), 1_usize..40), 0..30), key_width in 1_u8..=16) {
            let input: Vec<u8> = runs.iter().flat_map(|&(b, n)| std::iter::repeat(b).take(n)).collect();
            prop_assert_eq!(round_trip(&input, key_width), input);
        }
    }
}
