use crate::models::ImageId;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("image not found")]
    NotFound,

    #[error("image already indexed with id {0}")]
    Duplicate(ImageId),

    #[error("{0}")]
    Validation(String),

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("cannot decode the image payload")]
    InvalidPayload,

    #[error("{0}")]
    Configuration(String),

    #[error("internal invariant violated: {0}")]
    Computation(String),

    #[error("not implemented")]
    NotImplemented,

    #[error("io error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        AppError::Computation(msg.into())
    }
}
