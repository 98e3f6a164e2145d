use std::error;
use std::fmt;

/// All possible mailpost errors.
/// Each variant carries enough context to be logged on its own.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Reading the raw message stream failed
    Stream(String),

    /// The stream did not match its declared size
    DataIntegrity { expected: usize, actual: usize },

    /// No buffer could be allocated for the declared size
    Allocation { size: usize },

    /// The raw message could not be parsed as MIME
    Parse(String),

    /// Missing or invalid configuration
    Config(String),

    /// The endpoint answered with a non-success status
    Delivery { status: u16, reason: String },

    /// Connection, DNS or protocol failure while talking to the endpoint
    Transport(String),

    Timeout,

    /// JSON encoding of the email or decoding of the response failed
    Json(String),
}

impl Error {
    /// Returns `true` if a later redelivery of the same message could succeed.
    pub fn is_temporary(&self) -> bool {
        match *self {
            Error::Transport(_) | Error::Timeout => true,
            Error::Delivery { status, .. } => status >= 500 || status == 429,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Stream(ref msg) => write!(f, "Stream: {}", msg),
            Error::DataIntegrity { expected, actual } => write!(
                f,
                "DataIntegrity: declared {} bytes, stream carried {}",
                expected, actual
            ),
            Error::Allocation { size } => {
                write!(f, "Allocation: cannot buffer a message of {} bytes", size)
            }
            Error::Parse(ref msg) => write!(f, "Parse: {}", msg),
            Error::Config(ref msg) => write!(f, "Config: {}", msg),
            Error::Delivery { status, ref reason } => write!(
                f,
                "Delivery: failed to post parsed email data: {} {}",
                status, reason
            ),
            Error::Transport(ref msg) => write!(f, "Transport: {}", msg),
            Error::Timeout => f.write_str("Timeout"),
            Error::Json(ref msg) => write!(f, "Json: {}", msg),
        }
    }
}

impl error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Stream(err.to_string())
    }
}

impl From<mailparse::MailParseError> for Error {
    fn from(err: mailparse::MailParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Json(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::error::Error> for Error {
    fn from(err: serde_json::error::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid endpoint URL: {}", err))
    }
}
