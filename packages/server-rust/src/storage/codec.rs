//! Stock identifier codec for services configured with hashed identity.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::traits::IdentifierCodec;

/// Encodes identifiers as URL-safe, unpadded `base64` of a salted payload.
///
/// The salt is prepended before encoding and checked on decode, so codes
/// minted for one service do not decode under another service's salt.
#[derive(Debug, Clone)]
pub struct Base64IdCodec {
    salt: String,
}

impl Base64IdCodec {
    #[must_use]
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }
}

impl IdentifierCodec for Base64IdCodec {
    fn decode(&self, code: &str) -> Option<String> {
        let bytes = URL_SAFE_NO_PAD.decode(code).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let id = text.strip_prefix(&self.salt)?.strip_prefix(':')?;
        (!id.is_empty()).then(|| id.to_string())
    }

    fn encode(&self, id: &str) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{id}", self.salt))
    }
}
