use thiserror::Error;

/// Errors that can occur when an allocator is asked for memory.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The request is larger than the allocator can represent. Nothing was allocated.
    #[error("requested {requested} bytes but this allocator serves at most {max} bytes per request")]
    SizeOverflow {
        /// Size of the rejected request, in bytes.
        requested: usize,

        /// Largest request the allocator accepts, in bytes.
        max: usize,
    },

    /// The global allocator at the bottom of the stack could not provide the memory.
    ///
    /// Strategies that forward to a backing allocator pass this through unchanged.
    #[error("out of memory while allocating {size} bytes")]
    Exhausted {
        /// Size of the request that reached the global allocator, in bytes.
        size: usize,
    },
}

/// A specialized `Result` type for allocator operations, returning the crate's
/// [`Error`] type as the error value.
///
/// Public because implementations of [`ByteAllocator`][crate::ByteAllocator] outside this crate
/// return it too.
pub type Result<T> = std::result::Result<T, Error>;
