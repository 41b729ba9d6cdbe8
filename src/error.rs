use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("not found '{0}'")]
    NotFound(String),

    #[error("already exists '{0}'")]
    AlreadyExists(String),

    #[error("path '{path}' matches more than one root ('{root}')")]
    AmbiguousRoot { path: String, root: String },

    #[error("config '{path}': {message}")]
    ConfigIo { path: String, message: String },

    #[error("database: {0}")]
    Transaction(#[from] rusqlite::Error),

    #[error("unsupported index schema: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, Error>;
