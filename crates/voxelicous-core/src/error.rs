//! Error types for the engine.
//!
//! `ErrorKind` enumerates the fatal conditions that bubble to a caller
//! through a `Result` (builder/registry/codec misuse). Recoverable
//! conditions named by the same design document — a full ingestion
//! ring buffer, a ray missing the octree, a degenerate compression
//! block — are not represented here: they are part of the normal return
//! surface of the operation that can produce them (`VoxelQueue::enqueue`
//! returns `Err(Error)` too, since "caller may retry" still reads
//! naturally as a `Result`; ray casts use `RayOutcome`/`MissReason`
//! instead, since a miss is not an error at all).

use thiserror::Error;

/// The kind of fatal condition that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A Morton codec input exceeded the representable `+/-2^20` range.
    OutOfRange,
    /// A brick id was never allocated, or was already freed.
    InvalidBrick,
    /// A typed attribute view was requested with the wrong scalar type.
    TypeMismatch,
    /// The builder was invoked with bounds inconsistent with `max_levels`/`brick_depth`.
    InvalidBounds,
    /// The ingestion ring buffer has no free slot.
    QueueFull,
    /// `enqueue` was called after `stop()`.
    QueueStopped,
}

/// Engine-wide error type: a fatal condition plus a human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// The kind of condition that produced this error.
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A Morton-coded coordinate fell outside `+/-2^20`.
    pub fn out_of_range(x: i64, y: i64, z: i64) -> Self {
        Self::new(
            ErrorKind::OutOfRange,
            format!("coordinate ({x}, {y}, {z}) exceeds the representable Morton range of +/-2^20"),
        )
    }

    /// A brick id was accessed that is not currently allocated.
    pub fn invalid_brick(brick_id: u32) -> Self {
        Self::new(ErrorKind::InvalidBrick, format!("brick {brick_id} is not allocated"))
    }

    /// A typed view was requested against an attribute of a different scalar type.
    pub fn type_mismatch(attribute: &str, expected: &str, found: &str) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("attribute '{attribute}' is {found}, expected {expected}"),
        )
    }

    /// The builder's world bounds are not a power-of-two cube consistent with its levels.
    pub fn invalid_bounds(max_levels: u32, brick_depth: u32) -> Self {
        Self::new(
            ErrorKind::InvalidBounds,
            format!(
                "world bounds are not a power-of-two-aligned cube consistent with max_levels={max_levels} and brick_depth={brick_depth}"
            ),
        )
    }

    /// The ingestion ring buffer is at capacity; the caller may retry.
    pub fn queue_full() -> Self {
        Self::new(ErrorKind::QueueFull, "ingestion ring buffer is full".to_string())
    }

    /// `enqueue` was called after the ingestion queue was stopped.
    pub fn queue_stopped() -> Self {
        Self::new(ErrorKind::QueueStopped, "ingestion queue has been stopped".to_string())
    }
}

/// Result type alias using the engine's `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_constructor() {
        let err = Error::invalid_brick(7);
        assert_eq!(err.kind(), ErrorKind::InvalidBrick);
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn out_of_range_message_contains_coordinates() {
        let err = Error::out_of_range(1 << 21, 0, 0);
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert!(err.to_string().contains("2097152"));
    }
}
