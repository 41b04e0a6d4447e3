//! Error types for credential store operations

/// Errors from credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The storage engine failed (I/O, lost file, poisoned state).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded for, or decoded from, storage.
    #[error("codec error in table {table}: {message}")]
    Codec { table: &'static str, message: String },

    /// Key material inside a value was rejected by the key abstraction.
    #[error(transparent)]
    Key(#[from] dpop_key::Error),

    #[error("cleanup scheduler already running for this store")]
    SchedulerRunning,
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
