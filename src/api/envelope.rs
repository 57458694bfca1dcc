use crate::error::{Result, WeixinError};
use serde::Deserialize;

/// The wrapper every API response arrives in.
///
/// For example, a token response looks like:
/// ```json
/// {
///     "errcode": 0,
///     "errmsg": "ok",
///     "access_token": "accesstoken000001",
///     "expires_in": 7200
/// }
/// ```
///
/// `errcode` and `errmsg` are common to all calls; everything else is
/// specific to the call and lands in `payload`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Zero on success. Some successful responses omit it entirely.
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.errcode == 0
    }

    /// Splits the envelope into its payload, or the error it reports.
    pub fn into_result(self) -> Result<T> {
        if self.is_success() {
            Ok(self.payload)
        } else {
            Err(WeixinError::Api {
                code: self.errcode,
                message: self.errmsg,
            })
        }
    }
}
