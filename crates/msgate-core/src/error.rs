use thiserror::Error;

/// Errors produced by the msgate protocol layer.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("token store error: {0}")]
    TokenStore(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<ciborium::de::Error<std::io::Error>> for GateError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        GateError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for GateError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        GateError::Codec(e.to_string())
    }
}

pub type GateResult<T> = Result<T, GateError>;
