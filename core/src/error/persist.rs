use thiserror::Error;

/// Errors raised by the durable key-value store.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("persist io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("persist encoding error for key '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[error("persist decoding error for key '{key}': {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    #[error("persist store at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}
