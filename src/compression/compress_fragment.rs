use std::fs::File;
use std::io::{BufWriter, Write};

use log::{debug, info, trace};

use crate::bitstream::bititer::BitIterator;
use crate::bitstream::bitpacker::BitPacker;
use crate::compression::container::{
    DataHeader, Fragment, FragmentPaths, MetaHeader, MetaTrailer, DATA_HEADER_LEN,
    META_HEADER_LEN, META_TRAILER_LEN, MAX_WIDTH, MIN_WIDTH,
};
use crate::error::RleError;
use crate::tools::run_counts::RunCounts;

/// What one worker produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSummary {
    pub input_bytes: u64,
    pub key_width: u8,
    pub keys: u64,
    pub runs: u64,
    pub max_count: u64,
    pub run_width: u8,
    pub tail_padding: u8,
    pub checksum: u32,
}

impl FragmentSummary {
    pub fn data_bytes(&self) -> u64 {
        DATA_HEADER_LEN + (self.runs * self.key_width as u64 + 7) / 8
    }

    pub fn meta_bytes(&self) -> u64 {
        META_HEADER_LEN + (self.runs * self.run_width as u64 + 7) / 8 + META_TRAILER_LEN
    }
}

/// Run length encode `buffer` as a sequence of `key_width` bit keys. The unique key of each run
/// goes to `data`, the run counts (and the headers/trailer) go to `meta`.
///
/// Keys are compared and stored right-aligned. Every run is recorded, singletons included, and
/// the run still open when the buffer ends is flushed like any other.
pub fn encode_fragment<D: Write, M: Write>(
    buffer: &[u8],
    key_width: u8,
    producers: u8,
    data: D,
    meta: M,
) -> Result<FragmentSummary, RleError> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&key_width) {
        return Err(RleError::InvalidKeyWidth(key_width.to_string()));
    }
    let shift = 64 - key_width as u32;
    let mut keys = BitIterator::new(buffer, key_width);
    let key_count = keys.group_count();

    let data = DataHeader { key_width }.write_to(data)?;
    let mut packer = BitPacker::new(data, key_width);
    let mut counts = RunCounts::new();

    if let Some(first) = keys.next() {
        let mut last = first >> shift;
        let mut count = 1_u64;
        for key in keys.by_ref() {
            let key = key >> shift;
            if key == last {
                count += 1;
            } else {
                packer.push(last)?;
                counts.push(count);
                last = key;
                count = 1;
            }
        }
        packer.push(last)?;
        counts.push(count);
    }
    trace!("Data record body ends at {}", packer.loc());
    packer.finish()?;

    let header = MetaHeader {
        producers,
        num_runs: counts.len() as u64,
        run_width: counts.run_width(),
    };
    let meta = header.write_to(meta)?;
    let mut packer = BitPacker::new(meta, header.run_width);
    for count in counts.iter() {
        packer.push(count)?;
    }
    let meta = packer.finish()?;

    let trailer = MetaTrailer {
        tail_padding: keys.padding_bits(),
        checksum: crc32fast::hash(buffer),
    };
    trailer.write_to(meta)?;

    debug!(
        "Encoded {} keys of {} bits into {} runs (max count {}, {} bit counts)",
        key_count,
        key_width,
        header.num_runs,
        counts.max_count(),
        header.run_width
    );
    Ok(FragmentSummary {
        input_bytes: buffer.len() as u64,
        key_width,
        keys: key_count,
        runs: header.num_runs,
        max_count: counts.max_count(),
        run_width: header.run_width,
        tail_padding: trailer.tail_padding,
        checksum: trailer.checksum,
    })
}

/// Encode `buffer` into an in-memory fragment.
pub fn compress_to_fragment(
    buffer: &[u8],
    key_width: u8,
    producers: u8,
) -> Result<(Fragment, FragmentSummary), RleError> {
    let mut fragment = Fragment::default();
    let summary = encode_fragment(
        buffer,
        key_width,
        producers,
        &mut fragment.data,
        &mut fragment.meta,
    )?;
    Ok((fragment, summary))
}

/// Encode `buffer` and write the fragment's .data and .meta files. Both files are created fresh
/// and written once, front to back.
pub fn write_fragment(
    buffer: &[u8],
    key_width: u8,
    producers: u8,
    paths: &FragmentPaths,
) -> Result<FragmentSummary, RleError> {
    let create = |path: &std::path::Path| {
        File::create(path).map_err(|source| RleError::Create {
            path: path.to_path_buf(),
            source,
        })
    };
    let data = BufWriter::new(create(&paths.data)?);
    let meta = BufWriter::new(create(&paths.meta)?);
    let summary = encode_fragment(buffer, key_width, producers, data, meta)?;
    info!(
        "Wrote {} ({} bytes) and {} ({} bytes).",
        paths.data.display(),
        summary.data_bytes(),
        paths.meta.display(),
        summary.meta_bytes()
    );
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitstream::bitreader::BitReader;

    /// Split a fragment back into its keys and counts by hand.
    fn unpack(fragment: &Fragment) -> (u8, Vec<u64>, MetaHeader, Vec<u64>) {
        let mut meta = BitReader::new(fragment.meta.as_slice());
        let header = MetaHeader::read_from(&mut meta).unwrap();
        let counts: Vec<u64> = (0..header.num_runs)
            .map(|_| meta.read(header.run_width).unwrap())
            .collect();
        let mut data = BitReader::new(fragment.data.as_slice());
        let key_width = DataHeader::read_from(&mut data).unwrap().key_width;
        let keys: Vec<u64> = (0..header.num_runs)
            .map(|_| data.read(key_width).unwrap())
            .collect();
        (key_width, keys, header, counts)
    }

    #[test]
    fn worked_example() {
        let input = [0xFF, 0xFF, 0x00, 0x00, 0xAB];
        let (fragment, summary) = compress_to_fragment(&input, 8, 1).unwrap();

        assert_eq!(fragment.data, vec![8, 255, 0, 171]);
        let crc = crc32fast::hash(&input).to_be_bytes();
        let mut meta = vec![1, 0, 0, 0, 0, 0, 3, 2, 0b1010_0100, 0];
        meta.extend_from_slice(&crc);
        assert_eq!(fragment.meta, meta);

        assert_eq!(summary.runs, 3);
        assert_eq!(summary.max_count, 2);
        assert_eq!(summary.run_width, 2);
        assert_eq!(summary.keys, 5);
        assert_eq!(summary.data_bytes(), fragment.data.len() as u64);
        assert_eq!(summary.meta_bytes(), fragment.meta.len() as u64);
    }

    #[test]
    fn identical_keys_make_one_run() {
        let input = vec![0x5A; 1000];
        let (fragment, summary) = compress_to_fragment(&input, 8, 1).unwrap();
        let (_, keys, header, counts) = unpack(&fragment);
        assert_eq!(keys, vec![0x5A]);
        assert_eq!(counts, vec![1000]);
        assert_eq!(header.run_width, 10);
        assert_eq!(summary.max_count, 1000);
    }

    #[test]
    fn alternating_keys_are_all_singletons() {
        let input: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 0x0F } else { 0xF0 }).collect();
        let (fragment, _) = compress_to_fragment(&input, 8, 1).unwrap();
        let (_, keys, header, counts) = unpack(&fragment);
        assert_eq!(header.num_runs, 64);
        assert_eq!(header.run_width, 1);
        assert!(counts.iter().all(|&c| c == 1));
        assert_eq!(keys.iter().map(|&k| k as u8).collect::<Vec<u8>>(), input);
    }

    #[test]
    fn last_run_is_flushed() {
        // Ends in a run of zero keys, which must not be dropped.
        let (fragment, _) = compress_to_fragment(&[7, 0, 0, 0], 8, 1).unwrap();
        let (_, keys, _, counts) = unpack(&fragment);
        assert_eq!(keys, vec![7, 0]);
        assert_eq!(counts, vec![1, 3]);
    }

    #[test]
    fn sub_byte_keys() {
        // 0xF0 0x0F as 4 bit keys: F, 0, 0, F.
        let (fragment, summary) = compress_to_fragment(&[0xF0, 0x0F], 4, 2).unwrap();
        let (key_width, keys, header, counts) = unpack(&fragment);
        assert_eq!(key_width, 4);
        assert_eq!(keys, vec![0xF, 0, 0xF]);
        assert_eq!(counts, vec![1, 2, 1]);
        assert_eq!(header.producers, 2);
        assert_eq!(summary.tail_padding, 0);
    }

    #[test]
    fn padding_is_recorded() {
        // 3 bytes of 64 bit keys: one key with 40 padding bits.
        let (_, summary) = compress_to_fragment(&[1, 2, 3], 64, 1).unwrap();
        assert_eq!(summary.keys, 1);
        assert_eq!(summary.tail_padding, 40);

        let (_, summary) = compress_to_fragment(&[0xFF], 3, 1).unwrap();
        assert_eq!(summary.keys, 3);
        assert_eq!(summary.tail_padding, 1);
    }

    #[test]
    fn empty_input_has_no_runs() {
        let (fragment, summary) = compress_to_fragment(&[], 8, 1).unwrap();
        assert_eq!(fragment.data, vec![8]);
        assert_eq!(summary.runs, 0);
        assert_eq!(summary.run_width, 1);
        assert_eq!(&fragment.meta[..8], &[1, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(fragment.meta.len(), 13);
    }

    #[test]
    fn bad_key_width_is_an_argument_error() {
        assert!(matches!(
            compress_to_fragment(&[1], 0, 1),
            Err(RleError::InvalidKeyWidth(_))
        ));
    }

    #[test]
    fn files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FragmentPaths::from_base(&dir.path().join("frag0"));
        let summary = write_fragment(b"aaaabbbc", 8, 1, &paths).unwrap();
        assert_eq!(std::fs::read(&paths.data).unwrap(), b"\x08abc".to_vec());
        let meta = std::fs::read(&paths.meta).unwrap();
        assert_eq!(meta.len() as u64, summary.meta_bytes());
        assert_eq!(&meta[..8], &[1, 0, 0, 0, 0, 0, 3, 3]);
    }
}
