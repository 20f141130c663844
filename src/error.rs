use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    InvalidHeader,
    InvalidMagic,
    UnsupportedVersion(u32),
    Decode(&'static str, io::Error),
    Encode(&'static str, io::Error),
    // Codec negotiation
    NotMatchingEncoder,
    CodecNotConfigured,
    HeaderTooShort(usize, usize),
    // Capacity
    KeyTooLong(usize, usize),
    ValueTooLong(usize, usize),
    StateSizeMismatch(usize, usize),
    BlockOverflow(usize, usize),
    // Corruption
    ShortWord(usize, usize),
    BadValueLength(u32, usize),
    ChecksumMismatch,
    // Serializers
    NotAscii,
    Serialize(String),
    // Concurrency and collaborators
    MutexPoisoned,
    LockError(io::Error),
    InvalidInput(String),
    Aggregated(Vec<Error>),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::MutexPoisoned
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::InvalidHeader => write!(f, "Invalid header"),
            Error::InvalidMagic => write!(f, "Invalid block file magic"),
            Error::UnsupportedVersion(v) => write!(f, "Unsupported block file version: {}", v),
            Error::Decode(field, err) => write!(f, "Failed to decode {}: {}", field, err),
            Error::Encode(field, err) => write!(f, "Failed to encode {}: {}", field, err),
            Error::NotMatchingEncoder => write!(f, "Encoder does not match"),
            Error::CodecNotConfigured => write!(f, "Codec is not configured"),
            Error::HeaderTooShort(len, need) => write!(
                f,
                "Header too short: {} bytes, need at least {} to setup",
                len, need
            ),
            Error::KeyTooLong(len, max) => {
                write!(f, "Key is longer than configured keySize: {} > {}", len, max)
            }
            Error::ValueTooLong(len, max) => {
                write!(f, "Value is longer than configured valSize: {} > {}", len, max)
            }
            Error::StateSizeMismatch(len, size) => {
                write!(f, "State length {} does not match stateSize {}", len, size)
            }
            Error::BlockOverflow(len, size) => {
                write!(f, "Write of {} bytes does not fit a block of {}", len, size)
            }
            Error::ShortWord(len, size) => write!(
                f,
                "Cannot decode data of length: {} < wordSize: {}",
                len, size
            ),
            Error::BadValueLength(len, max) => {
                write!(f, "Bad encoded value length: {} > {}", len, max)
            }
            Error::ChecksumMismatch => write!(f, "Checksum mismatch"),
            Error::NotAscii => write!(f, "Supplied text is out of ASCII table"),
            Error::Serialize(msg) => write!(f, "Serialization failed: {}", msg),
            Error::MutexPoisoned => write!(f, "Mutex was poisoned"),
            Error::LockError(err) => write!(f, "Lock error: {}", err),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Aggregated(errors) => {
                write!(f, "{} errors:", errors.len())?;
                for err in errors {
                    write!(f, " [{}]", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}
