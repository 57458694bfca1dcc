//! A client for the WeChat Work (企业微信) server API.
//!
//! The client exchanges a corporate id and secret for a short-lived access
//! token, caches it until shortly before it expires, and attaches it to
//! every API call. Every response is checked for the API's
//! `{errcode, errmsg}` envelope.
//!
//! ```no_run
//! use weixin::{Client, Message};
//!
//! # async fn run() -> weixin::Result<()> {
//! let client = Client::new("ww0123456789abcdef", "application-secret")?;
//! let message = Message::text(1000002, "deploy finished").to_users(["zhangsan"]);
//! client.send_message(&message).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
mod error;

pub use api::{Client, Envelope, Message, MessageContent, RequestMethod, SendMessageResponse};
pub use auth::{AccessToken, Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use auth::ManualClock;
pub use config::ClientConfig;
pub use error::{Result, WeixinError};
