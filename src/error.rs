// Error types shared across the crate.

use crate::core_modules::geometry::Direction;

/// Failures raised by an `ImageOps` collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ImageOpError {
    #[error("image operation failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    Dimensions { expected: usize, actual: usize },

    #[error("unsupported rotation of {0} degrees")]
    Rotation(u32),

    #[error("image task did not complete: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    /// The observation was rejected before touching any state.
    #[error("malformed observation: {0}")]
    MalformedObservation(String),

    /// Composition of one cluster failed in the image collaborator.
    #[error("composition failed for {direction}: {source}")]
    Collaborator {
        direction: Direction,
        #[source]
        source: ImageOpError,
    },

    #[error("aggregation session has shut down")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, MosaicError>;
