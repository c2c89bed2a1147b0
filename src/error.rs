pub type ScrivoResult<T> = Result<T, ScrivoError>;

#[derive(thiserror::Error, Debug)]
pub enum ScrivoError {
    /// The uploaded blob is not an image or not one of the supported formats.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Image bytes could not be rasterized, including a failed transcode.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Both the primary and the fallback background construction paths failed.
    #[error("image load failure: {0}")]
    ImageLoadFailure(String),

    /// Batch export was requested with an empty name list.
    #[error("name list is empty")]
    EmptyNameList,

    /// An export was requested before the session was initialized.
    #[error("canvas surface is not initialized")]
    NoSurface,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScrivoError {
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn decode_failure(msg: impl Into<String>) -> Self {
        Self::DecodeFailure(msg.into())
    }

    pub fn image_load_failure(msg: impl Into<String>) -> Self {
        Self::ImageLoadFailure(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
