use std::io;
use std::num::TryFromIntError;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// Input isn't a usable GIF
        Decode(msg: String) {
            display("GIF decoding error: {}", msg)
            from(err: gif::DecodingError) -> (err.to_string())
            from(err: gif_dispose::Error) -> (err.to_string())
        }
        /// Frames can't be written as a GIF
        Encode(msg: String) {
            display("GIF encoding error: {}", msg)
            from(err: TryFromIntError) -> (err.to_string())
            from(err: resize::Error) -> (err.to_string())
        }
        Quant(liq: imagequant::Error) {
            from()
            display("pngquant error: {}", liq)
        }
        NotFound(key: String) {
            display("Artifact not found: {}", key)
        }
        InvalidParameter(msg: String) {
            display("{}", msg)
        }
        LockTimeout(key: String) {
            display("Timed out waiting for artifact {}", key)
        }
        Io(err: io::Error) {
            from()
            from(_oom: std::collections::TryReserveError) -> (io::ErrorKind::OutOfMemory.into())
            display("I/O: {}", err)
            source(err)
        }
        /// Internal error
        ThreadSend {
            display("Internal error; unexpectedly aborted")
        }
    }
}

pub type GifResult<T, E = Error> = Result<T, E>;

/// Coarse category of an [`Error`], for callers that map errors to responses
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Encode,
    NotFound,
    InvalidParameter,
    Busy,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::Encode(_) | Self::Quant(_) => ErrorKind::Encode,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::LockTimeout(_) => ErrorKind::Busy,
            Self::Io(_) | Self::ThreadSend => ErrorKind::Internal,
        }
    }
}

impl From<gif::EncodingError> for Error {
    #[cold]
    fn from(err: gif::EncodingError) -> Self {
        match err {
            gif::EncodingError::Io(err) => err.into(),
            other => Error::Encode(other.to_string()),
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    #[cold]
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Self::ThreadSend
    }
}
