use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaperSliceError>;

#[derive(Debug, Error)]
pub enum PaperSliceError {
    /// The offscreen rendering surface could not be created or populated.
    #[error("render surface unavailable: {0}")]
    RenderUnavailable(String),
    /// Rasterization, page encoding or PDF assembly failed.
    #[error("export failed: {0}")]
    ExportFailed(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PaperSliceError {
    pub(crate) fn export(message: impl Into<String>) -> Self {
        PaperSliceError::ExportFailed(message.into())
    }

    pub(crate) fn render(message: impl Into<String>) -> Self {
        PaperSliceError::RenderUnavailable(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        PaperSliceError::InvalidConfiguration(message.into())
    }
}

impl From<lopdf::Error> for PaperSliceError {
    fn from(value: lopdf::Error) -> Self {
        PaperSliceError::ExportFailed(format!("pdf assembly error: {value}"))
    }
}

impl From<image::ImageError> for PaperSliceError {
    fn from(value: image::ImageError) -> Self {
        PaperSliceError::ExportFailed(format!("image encode error: {value}"))
    }
}
