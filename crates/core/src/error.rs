use std::path::PathBuf;

/// Result alias that carries the custom [`RenderError`] type.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Common error type for the core crate.
///
/// Every variant is terminal for a render run: nothing is retried and the
/// binary reports the error on stderr, never on the output sink.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Free-form message for failures that have no dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors, including sink write failures.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("cannot read chart {path}")]
    ChartRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("chart {path} is neither UTF-8 nor Shift_JIS text")]
    ChartDecode { path: PathBuf },
    #[error("cannot load bitmap {path}: {reason}")]
    BitmapDecode { path: PathBuf, reason: String },
    #[error(
        "bitmap {path} has dimensions {width}x{height}, different from initial {expected_width}x{expected_height}"
    )]
    BitmapSize {
        path: PathBuf,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("cannot load wave {path}: {reason}")]
    WaveDecode { path: PathBuf, reason: String },
    #[error("cannot find wave `{name}` under any supported extension")]
    WaveNotFound { name: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RenderError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
