//! Hashing utilities for artifact checksums and cache keys.

use md5::Md5;
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

/// The checksum algorithm named by a link fragment is not one we can verify.
#[derive(Debug, Error)]
#[error("unsupported checksum algorithm `{0}`")]
pub struct UnsupportedAlgorithm(pub String);

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// Compute the hex digest of `data` under the named algorithm.
///
/// Index listing pages attach checksums as `algorithm=hexdigest` URL
/// fragments; `md5` still appears on older uploads, newer ones carry
/// `sha256`.
pub fn digest(algorithm: &str, data: &[u8]) -> Result<String, UnsupportedAlgorithm> {
    let value = match algorithm {
        "md5" => {
            let mut hasher = Md5::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        "sha256" => sha256_bytes(data),
        "sha384" => {
            let mut hasher = Sha384::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        "sha512" => {
            let mut hasher = Sha512::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        other => return Err(UnsupportedAlgorithm(other.to_string())),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_str() {
        let hash = sha256_str("hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digest_by_algorithm() {
        assert_eq!(
            digest("md5", b"hello").unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(digest("sha256", b"hello").unwrap(), sha256_str("hello"));
    }

    #[test]
    fn test_unknown_algorithm() {
        let err = digest("crc32", b"hello").unwrap_err();
        assert!(err.to_string().contains("crc32"));
    }
}
