use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Source '{}' unavailable: {source}", path.display())]
    SourceUnavailable { path: PathBuf, source: io::Error },

    #[error("Archive corrupted at frame {frame}: {reason}")]
    CorruptedArchive { frame: usize, reason: String },

    #[error("Block {index} could not be decoded: {source}")]
    BlockDecode { index: usize, source: CodecError },

    #[error("Block {index} could not be encoded: {source}")]
    BlockEncode { index: usize, source: CodecError },

    #[error("Destination '{}' could not be written: {source}", path.display())]
    DestinationWrite { path: PathBuf, source: io::Error },

    #[error("Payload of {0} bytes does not fit a frame length prefix")]
    FrameTooLarge(usize),

    #[error("Internal pipeline error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Short stable name of the failure class, for exit messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_)          => "ConfigurationError",
            Error::SourceUnavailable { .. }  => "SourceUnavailable",
            Error::CorruptedArchive { .. }   => "CorruptedArchive",
            Error::BlockDecode { .. }        => "BlockDecodeError",
            Error::BlockEncode { .. }        => "BlockEncodeError",
            Error::DestinationWrite { .. }   => "DestinationWriteFailure",
            Error::FrameTooLarge(_)          => "FrameTooLarge",
            Error::Internal(_)               => "InternalError",
            Error::Io(_)                     => "IoError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
