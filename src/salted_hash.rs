use fast32::base64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the random salt in bytes
pub const SALT_LENGTH: usize = 16;

const TAG: &str = "{SSHA256}";
const DIGEST_LENGTH: usize = 32;

/// A salted, one-way SHA-256 digest in its stored form
///
/// The representation is `{SSHA256}` followed by
/// `base64(sha256(data ‖ salt) ‖ salt)`. Neither the hashed data nor any
/// secret it was derived from can be recovered from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaltedDigest(String);

impl SaltedDigest {
    /// The tagged string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-rendered digest string, e.g. one read from storage
    pub fn from_stored(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }
}

impl std::fmt::Display for SaltedDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash `data` with a freshly generated random salt
pub fn hash(data: &[u8]) -> SaltedDigest {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rng().fill(&mut salt);
    hash_with_salt(data, &salt)
}

/// Hash `data` with the given salt
pub fn hash_with_salt(data: &[u8], salt: &[u8; SALT_LENGTH]) -> SaltedDigest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(salt);
    let digest = hasher.finalize();

    let mut blob = Vec::with_capacity(DIGEST_LENGTH + SALT_LENGTH);
    blob.extend_from_slice(&digest);
    blob.extend_from_slice(salt);
    SaltedDigest(format!("{TAG}{}", base64::RFC4648.encode(&blob)))
}

/// Verify `data` against a stored digest
///
/// Extracts the salt from the stored representation, recomputes the digest
/// and compares in constant time. Malformed stored digests verify as
/// `false`; candidate values are attacker-observable, so the comparison
/// must not leak how far it got.
pub fn verify(data: &[u8], digest: &SaltedDigest) -> bool {
    let Some(body) = digest.0.strip_prefix(TAG) else {
        return false;
    };
    let Ok(blob) = base64::RFC4648.decode_str(body) else {
        return false;
    };
    if blob.len() != DIGEST_LENGTH + SALT_LENGTH {
        return false;
    }
    let (stored, salt) = blob.split_at(DIGEST_LENGTH);

    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(salt);
    let computed = hasher.finalize();

    ring::constant_time::verify_slices_are_equal(computed.as_ref(), stored).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_own_hash() {
        let digest = hash(b"755224");
        assert!(verify(b"755224", &digest));
    }

    #[test]
    fn verify_rejects_other_data() {
        let digest = hash(b"755224");
        assert!(!verify(b"287082", &digest));
        assert!(!verify(b"", &digest));
    }

    #[test]
    fn salts_make_digests_distinct() {
        let a = hash(b"755224");
        let b = hash(b"755224");
        assert_ne!(a, b);
        assert!(verify(b"755224", &a));
        assert!(verify(b"755224", &b));
    }

    #[test]
    fn fixed_salt_is_deterministic() {
        let salt = [7u8; SALT_LENGTH];
        assert_eq!(
            hash_with_salt(b"123456", &salt),
            hash_with_salt(b"123456", &salt)
        );
    }

    #[test]
    fn stored_form_is_tagged_base64() {
        let digest = hash_with_salt(b"123456", &[0u8; SALT_LENGTH]);
        let body = digest.as_str().strip_prefix("{SSHA256}").unwrap();
        let blob = base64::RFC4648.decode_str(body).unwrap();
        assert_eq!(blob.len(), DIGEST_LENGTH + SALT_LENGTH);
        assert_eq!(&blob[DIGEST_LENGTH..], &[0u8; SALT_LENGTH]);
    }

    #[test]
    fn malformed_digests_verify_false() {
        assert!(!verify(b"x", &SaltedDigest::from_stored("{SSHA256}")));
        assert!(!verify(b"x", &SaltedDigest::from_stored("{SSHA256}***")));
        assert!(!verify(b"x", &SaltedDigest::from_stored("{SSHA1}aGVsbG8=")));
        assert!(!verify(b"x", &SaltedDigest::from_stored("")));
    }
}
