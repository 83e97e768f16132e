use thiserror::Error;

#[derive(Error, Debug)]
pub enum MpdError {
    // Manifest errors
    #[error("Invalid manifest: {0}")]
    ManifestParse(String),

    #[error(transparent)]
    XmlError(#[from] quick_xml::Error),

    #[error("Invalid url template: {0}")]
    Template(String),

    #[error("Invalid base url path {path:?}: {reason}")]
    InvalidPath { path: Vec<usize>, reason: &'static str },

    #[error("No segment request for key {key:?} in period {period}")]
    KeyNotFound { period: usize, key: String },

    #[error("Can not determine segment count: {0}")]
    UnknownSegmentCount(String),

    // Network errors
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("Segment loading cancelled")]
    Cancelled,
}

impl MpdError {
    /// Whether a failed fetch may succeed when issued again.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::RequestError(_))
    }
}

pub type MpdResult<T> = Result<T, MpdError>;
