use super::hotp::{self, OtpDigits, OtpError};
use fast32::base32;
use rand::Rng;
use std::time::SystemTime;

/// The default period of a TOTP value in seconds
pub const RFC6238_TOTP_PERIOD: u64 = 30;

/// The default length of a TOTP secret in bytes
pub const RFC6238_TOTP_KEY_LENGTH: usize = 20;

/// TOTP secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpSecret(Box<[u8]>);

impl AsRef<[u8]> for TotpSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TotpSecret {
    /// Create a new TOTP secret from a byte array
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.into())
    }

    /// Create a new TOTP secret that complies with RFC 6238
    pub fn new_rfc6238() -> Self {
        let mut secret = [0u8; RFC6238_TOTP_KEY_LENGTH];
        rand::rng().fill(&mut secret);
        Self(secret.into())
    }

    /// Create a new TOTP secret from a base32 encoded string
    pub fn try_from_base32(secret: impl AsRef<str>) -> Result<Self, fast32::DecodeError> {
        let secret = base32::RFC4648_NOPAD
            .decode_str(secret.as_ref())?
            .into_boxed_slice();
        Ok(Self(secret))
    }

    /// Generate a TOTP value at the current time
    ///
    /// - `digits`: output width, 6 or 8 digits
    /// - `step_seconds`: length of one time step
    pub fn generate(&self, digits: OtpDigits, step_seconds: u64) -> Result<String, OtpError> {
        self.generate_at(digits, step_seconds, 0, SystemTime::now())
    }

    /// Generate a TOTP value at the given timestamp
    ///
    /// The counter is `floor((unix_time + offset_seconds) / step_seconds)`;
    /// everything past the counter derivation is plain HOTP.
    ///
    /// - `offset_seconds`: clock offset applied before the step division
    pub fn generate_at(
        &self,
        digits: OtpDigits,
        step_seconds: u64,
        offset_seconds: i64,
        timestamp: SystemTime,
    ) -> Result<String, OtpError> {
        let counter = Self::counter_at(step_seconds, offset_seconds, timestamp)?;
        hotp::HotpSecret::new(&self.0).generate(counter, digits)
    }

    /// Compute the TOTP counter for a timestamp
    pub fn counter_at(
        step_seconds: u64,
        offset_seconds: i64,
        timestamp: SystemTime,
    ) -> Result<u64, OtpError> {
        if step_seconds == 0 {
            return Err(OtpError::InvalidStep);
        }
        // SAFE: The timestamp is always after the UNIX epoch.
        #[allow(clippy::unwrap_used)]
        let unix = timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let shifted = unix
            .checked_add(offset_seconds)
            .ok_or(OtpError::CounterOverflow)?;
        if shifted < 0 {
            return Err(OtpError::CounterOverflow);
        }
        Ok(shifted as u64 / step_seconds)
    }

    /// Generate a URI for the TOTP secret
    pub fn to_uri(&self, label: impl AsRef<str>, issuer: impl AsRef<str>) -> String {
        format!(
            "otpauth://totp/{}?secret={}&issuer={}",
            label.as_ref(),
            base32::RFC4648_NOPAD.encode(&self.0),
            issuer.as_ref()
        )
    }
}
