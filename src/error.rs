use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Serial device could not be opened or read.
    #[error("device error: {0}")]
    Device(String),

    /// A token from the device line was not an integer.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("poll {0} not found")]
    PollNotFound(i64),

    /// Rejected poll submission.
    #[error("invalid poll: {0}")]
    InvalidPoll(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Errors the sampler recovers from by skipping the write.
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::Device(_) | Error::Parse(_))
    }
}

impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        Error::Device(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Device(e.to_string())
    }
}
