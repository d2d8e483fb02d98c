//! SRTP keying exchanged with Plain and Pipe transports.

use serde::{Deserialize, Serialize};

/// Keying material and cipher used by one side of an SRTP session.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SrtpParameters {
    pub crypto_suite: SrtpCryptoSuite,
    /// Concatenated master key and salt, Base64 encoded.
    pub key_base64: String,
}

/// Cipher and authentication tag combination, named as on the wire.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum SrtpCryptoSuite {
    #[serde(rename = "AEAD_AES_256_GCM")]
    AeadAes256Gcm,
    #[serde(rename = "AEAD_AES_128_GCM")]
    AeadAes128Gcm,
    #[serde(rename = "AES_CM_128_HMAC_SHA1_80")]
    AesCm128HmacSha180,
    #[serde(rename = "AES_CM_128_HMAC_SHA1_32")]
    AesCm128HmacSha132,
}

impl SrtpCryptoSuite {
    /// Length in bytes of the master key plus salt the suite expects before Base64 encoding.
    #[must_use]
    pub fn key_and_salt_len(self) -> usize {
        match self {
            Self::AeadAes256Gcm => 44,
            Self::AeadAes128Gcm => 28,
            Self::AesCm128HmacSha180 | Self::AesCm128HmacSha132 => 30,
        }
    }
}

impl Default for SrtpCryptoSuite {
    fn default() -> Self {
        Self::AesCm128HmacSha180
    }
}
