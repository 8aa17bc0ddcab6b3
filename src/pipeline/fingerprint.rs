use base64::Engine;
use sha2::{Digest, Sha256};

/// Content-addressed identifier: SHA-256 of the raw bytes, URL-safe base64
/// without padding (43 chars). Byte-identical uploads share a fingerprint
/// regardless of filename or declared media type.
pub fn fingerprint(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
}
