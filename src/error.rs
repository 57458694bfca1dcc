use thiserror::Error;

/// Everything that can go wrong while talking to the WeChat Work API.
#[derive(Debug, Error)]
pub enum WeixinError {
    /// The request could not be sent, or its body could not be read.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with a nonzero `errcode`.
    #[error("weixin return error, errcode: {code}, errmsg: {message}")]
    Api { code: i64, message: String },
    /// A request body could not be encoded, or a response body decoded.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported request method: {0}")]
    UnsupportedMethod(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// A request path that would leave the configured API base.
    #[error("path {0:?} resolves outside the api base")]
    PathOutsideBase(String),
    /// The API answered successfully but with values that make no sense.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl WeixinError {
    /// The remote `errcode`, if this error came from the API itself.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T, E = WeixinError> = std::result::Result<T, E>;
