//! WebPush: VAPID authentication, `aes128gcm` encryption, and the HTTP
//! sender built on them.

pub mod codec;
pub mod ece;
pub mod sender;
pub mod vapid;

pub use codec::{WebPushCodec, WebPushRequest};
pub use sender::WebPushSender;
pub use vapid::{VapidKeyPair, VapidSigner, verify_key_pair};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Decode base64url, tolerating trailing `=` padding from browsers.
pub fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim().trim_end_matches('='))
}
