use fast32::base32;
use rand::Rng;
use ring::hmac;

/// The default length of an HOTP secret in bytes (RFC 4226 recommendation)
pub const RFC4226_KEY_LENGTH: usize = 20;

/// Number of decimal digits in a generated OTP value
///
/// Only 6 and 8 digit values are valid, so the constraint is carried in the
/// type instead of being checked at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpDigits {
    /// 6-digit OTP values
    Six,
    /// 8-digit OTP values
    Eight,
}

impl OtpDigits {
    /// Width of the rendered OTP value in characters
    pub const fn width(self) -> usize {
        match self {
            OtpDigits::Six => 6,
            OtpDigits::Eight => 8,
        }
    }

    const fn modulus(self) -> u32 {
        match self {
            OtpDigits::Six => 1_000_000,
            OtpDigits::Eight => 100_000_000,
        }
    }
}

/// Error type for OTP generation
#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    /// The secret is empty
    #[error("OTP secret must not be empty")]
    InvalidKey,
    /// A counter computation left the 64-bit counter space
    #[error("counter range exceeds the 64-bit counter space")]
    CounterOverflow,
    /// The TOTP step length is zero
    #[error("TOTP step length must not be zero")]
    InvalidStep,
}

/// HOTP secret
pub struct HotpSecret(Box<[u8]>);

impl AsRef<[u8]> for HotpSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl HotpSecret {
    /// Create a new HOTP secret from a byte array
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.into())
    }

    /// Create a new random HOTP secret of [RFC4226_KEY_LENGTH] bytes
    pub fn random() -> Self {
        let mut secret = [0u8; RFC4226_KEY_LENGTH];
        rand::rng().fill(&mut secret);
        Self(secret.into())
    }

    /// Create a new HOTP secret from a base32 encoded string
    pub fn try_from_base32(secret: impl AsRef<str>) -> Result<Self, fast32::DecodeError> {
        let secret = base32::RFC4648_NOPAD
            .decode_str(secret.as_ref())?
            .into_boxed_slice();
        Ok(Self(secret))
    }

    /// Generate an HOTP value per RFC 4226
    ///
    /// Computes HMAC-SHA1 over the big-endian counter, applies dynamic
    /// truncation and renders the result as a left-zero-padded decimal
    /// string of the requested width.
    ///
    /// - `counter`: the counter value
    /// - `digits`: output width, 6 or 8 digits
    pub fn generate(&self, counter: u64, digits: OtpDigits) -> Result<String, OtpError> {
        if self.0.is_empty() {
            return Err(OtpError::InvalidKey);
        }
        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &self.0);
        let signature = hmac::sign(&key, &counter.to_be_bytes());
        let signature = signature.as_ref();
        let offset = (signature[signature.len() - 1] & 0x0f) as usize;
        let binary = ((signature[offset] & 0x7f) as u32) << 24
            | (signature[offset + 1] as u32) << 16
            | (signature[offset + 2] as u32) << 8
            | signature[offset + 3] as u32;
        let code = binary % digits.modulus();
        Ok(format!("{code:0width$}", width = digits.width()))
    }

    /// Verify an HOTP value at a fixed counter
    ///
    /// A plain comparison at one counter position; windowed matching against
    /// precomputed chains lives in [crate::verifier].
    pub fn verify(
        &self,
        candidate: &str,
        counter: u64,
        digits: OtpDigits,
    ) -> Result<bool, OtpError> {
        if candidate.len() != digits.width() {
            return Ok(false);
        }
        let expected = self.generate(counter, digits)?;
        Ok(
            ring::constant_time::verify_slices_are_equal(expected.as_bytes(), candidate.as_bytes())
                .is_ok(),
        )
    }

    /// Generate a URI for the HOTP secret
    pub fn to_uri(&self, label: impl AsRef<str>, issuer: impl AsRef<str>) -> String {
        format!(
            "otpauth://hotp/{}?secret={}&issuer={}",
            label.as_ref(),
            base32::RFC4648_NOPAD.encode(&self.0),
            issuer.as_ref()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // RFC 4226 appendix D, secret "12345678901234567890"
    const RFC4226_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn rfc4226_vectors() {
        let secret = HotpSecret::new(RFC4226_SECRET);
        let expected = [
            "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583",
            "399871", "520489",
        ];
        for (counter, exp) in expected.iter().enumerate() {
            let otp = secret.generate(counter as u64, OtpDigits::Six).unwrap();
            assert_eq!(&otp, exp, "mismatch at counter {counter}");
        }
    }

    #[test]
    fn eight_digit_values_are_padded() {
        let secret = HotpSecret::new(RFC4226_SECRET);
        let otp = secret.generate(0, OtpDigits::Eight).unwrap();
        assert_eq!(otp.len(), 8);
        // the 6-digit value is a suffix of the 8-digit one
        assert!(otp.ends_with("755224"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let secret = HotpSecret::new(b"");
        assert!(matches!(
            secret.generate(0, OtpDigits::Six),
            Err(OtpError::InvalidKey)
        ));
    }

    #[test]
    fn verify_matches_generate() {
        let secret = HotpSecret::new(RFC4226_SECRET);
        assert!(secret.verify("755224", 0, OtpDigits::Six).unwrap());
        assert!(!secret.verify("755224", 1, OtpDigits::Six).unwrap());
        assert!(!secret.verify("75522", 0, OtpDigits::Six).unwrap());
    }

    #[test]
    fn base32_roundtrip() {
        // base32("12345678901234567890")
        let secret = HotpSecret::try_from_base32("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap();
        assert_eq!(secret.as_ref(), RFC4226_SECRET);
    }

    #[test]
    fn random_secret_has_default_length() {
        let secret = HotpSecret::random();
        assert_eq!(secret.as_ref().len(), RFC4226_KEY_LENGTH);
    }
}
