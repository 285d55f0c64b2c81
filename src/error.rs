use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Bucket out of range: bucket_id={bucket_id}, num_buckets={num_buckets}")]
    OutOfRange { bucket_id: u64, num_buckets: u64 },

    #[error("Allocation failure: {0}")]
    Allocation(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
