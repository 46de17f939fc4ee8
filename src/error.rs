//! Error types shared by the codec, the worker group and the command line front end.
//!
//! Errors fall into four classes. Argument errors are caught before any file is touched, resource
//! errors come from the operating system, format errors describe a fragment that cannot be decoded,
//! and group errors describe a worker group that had to stop early.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The broad class of an error. `main` turns this into the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Argument,
    Resource,
    Format,
    Group,
}

impl ErrorClass {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorClass::Argument => 1,
            ErrorClass::Resource => 2,
            ErrorClass::Format => 3,
            ErrorClass::Group => 4,
        }
    }
}

#[derive(Error, Debug)]
pub enum RleError {
    #[error("Invalid key size \"{0}\"; must be in range of [1, 64]")]
    InvalidKeyWidth(String),

    #[error("Invalid number of workers \"{0}\"; must be in range of [1, 255]")]
    InvalidWorkerCount(usize),

    #[error("Error opening input file \"{path}\": {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error creating output file \"{path}\": {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error allocating {size} byte buffer for rank {rank}")]
    Allocation { rank: usize, size: usize },

    #[error("Short read from input: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Malformed fragment: {0}")]
    Format(#[from] FormatError),

    #[error("Rank {rank}: {reason}")]
    Protocol { rank: usize, reason: String },

    #[error("Worker group aborted")]
    Aborted,
}

impl RleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RleError::InvalidKeyWidth(_) | RleError::InvalidWorkerCount(_) => ErrorClass::Argument,
            RleError::Open { .. }
            | RleError::Create { .. }
            | RleError::Allocation { .. }
            | RleError::ShortRead { .. }
            | RleError::Io(_) => ErrorClass::Resource,
            RleError::Format(_) => ErrorClass::Format,
            RleError::Protocol { .. } | RleError::Aborted => ErrorClass::Group,
        }
    }
}

/// Problems found while reading a .data/.meta pair.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("key width {0} is outside [1, 64]")]
    InvalidKeyWidth(u8),

    #[error("run width {0} is outside [1, 64]")]
    InvalidRunWidth(u8),

    #[error("fragment claims zero producers")]
    NoProducers,

    #[error("{0} runs do not fit the 48 bit run counter")]
    TooManyRuns(u64),

    #[error("stream ended inside the {0}")]
    Truncated(&'static str),

    #[error("tail padding of {padding} bits does not fit a {key_width} bit key")]
    PaddingOutOfRange { padding: u8, key_width: u8 },

    #[error("checksum mismatch: fragment says {expected:#010x}, output hashes to {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classes_map_to_distinct_exit_codes() {
        let errors = [
            RleError::InvalidKeyWidth("0".into()),
            RleError::Allocation { rank: 1, size: 10 },
            RleError::Format(FormatError::NoProducers),
            RleError::Aborted,
        ];
        let codes: Vec<i32> = errors.iter().map(|e| e.class().exit_code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn io_errors_are_resource_errors() {
        let err: RleError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.class(), ErrorClass::Resource);
    }

    #[test]
    fn key_width_message_names_the_range() {
        let msg = RleError::InvalidKeyWidth("65".into()).to_string();
        assert_eq!(msg, "Invalid key size \"65\"; must be in range of [1, 64]");
    }
}
