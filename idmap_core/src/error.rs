use thiserror::Error;

/// Errors raised by the id indices.
#[derive(Debug, Error)]
pub enum Error {
    /// No value is recorded for the identifier.
    #[error("id {0} not found")]
    NotFound(u64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A raw image whose length is not a whole number of elements.
    #[error("image of {len} bytes is not a multiple of the {element_size} byte element size")]
    InvalidLength { len: u64, element_size: usize },
    /// A dense image with more slots than the id type can address.
    #[error("image holds {slots} slots but ids stop at {max_id}")]
    TooManySlots { slots: usize, max_id: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
