mod access_token;
mod clock;

pub use access_token::{AccessToken, CredentialManager, EXPIRY_MARGIN_SECS};
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
