use crate::hotp::OtpDigits;
use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use rand::Rng;
use tracing::debug;

/// The modhex alphabet, one symbol per nibble value
///
/// Chosen by the device vendor so that the characters land on the same
/// physical keys across keyboard layouts; it is not hexadecimal.
pub const MODHEX_ALPHABET: &[u8; 16] = b"cbdefghijklnrtuv";

/// The fixed plaintext block encrypted to derive a static password
///
/// Defined by the device protocol (static-ticket derivation, yubikey
/// manual 5.5.5): the same algorithm as a regular ticket with no moving
/// factors.
const STATIC_TICKET_BLOCK: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x0f, 0x2e,
];

/// AES key length used by the device, in bytes
pub const STATIC_KEY_LENGTH: usize = 16;

/// Length of the private uid programmed in Yubico mode, in bytes
pub const UID_LENGTH: usize = 6;

/// Length of an access key protecting the device configuration, in bytes
pub const ACCESS_KEY_LENGTH: usize = 6;

/// Encode bytes with the modhex alphabet, two symbols per byte
pub fn modhex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for &byte in data {
        out.push(MODHEX_ALPHABET[(byte >> 4) as usize] as char);
        out.push(MODHEX_ALPHABET[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Error type for static key handling
#[derive(Debug, thiserror::Error)]
pub enum StaticKeyError {
    /// The input is not valid hex of the right length
    #[error("static key must be {STATIC_KEY_LENGTH} hex-encoded bytes")]
    InvalidKey,
}

/// Fixed-length symmetric key a static password is derived from
pub struct StaticKey([u8; STATIC_KEY_LENGTH]);

impl AsRef<[u8]> for StaticKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl StaticKey {
    /// Create a static key from raw bytes
    pub fn new(key: [u8; STATIC_KEY_LENGTH]) -> Self {
        Self(key)
    }

    /// Create a new random static key
    pub fn random() -> Self {
        let mut key = [0u8; STATIC_KEY_LENGTH];
        rand::rng().fill(&mut key);
        Self(key)
    }

    /// Parse a static key from a hex string
    pub fn try_from_hex(key_hex: impl AsRef<str>) -> Result<Self, StaticKeyError> {
        let bytes = hex::decode(key_hex.as_ref()).map_err(|_| StaticKeyError::InvalidKey)?;
        let key: [u8; STATIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| StaticKeyError::InvalidKey)?;
        Ok(Self(key))
    }
}

/// Derive the static password for a key
///
/// Encrypts the fixed static-ticket block with AES-128 in ECB mode (a
/// single block, so no padding or chaining is involved) and renders the
/// ciphertext as modhex. Deterministic: the same key always yields the
/// same password.
pub fn derive_static_password(key: &StaticKey) -> String {
    let cipher = Aes128::new(GenericArray::from_slice(&key.0));
    let mut block = GenericArray::clone_from_slice(&STATIC_TICKET_BLOCK);
    cipher.encrypt_block(&mut block);
    modhex_encode(&block)
}

/// Programming mode for a hardware token slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// Vendor OTP mode with a 16-byte AES key and a private uid
    Yubico,
    /// OATH HOTP mode with a 20-byte HMAC key
    Oath,
    /// Static password mode, 16-byte AES key with the static-ticket flag
    Static,
}

impl TokenMode {
    /// Length of the key material generated for this mode, in bytes
    pub const fn key_length(self) -> usize {
        match self {
            TokenMode::Yubico | TokenMode::Static => 16,
            TokenMode::Oath => 20,
        }
    }
}

/// How the public id prepended to the device output is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicId {
    /// No public id
    None,
    /// The device serial number, as its decimal digits
    Serial,
    /// A caller-supplied byte string
    Fixed(Vec<u8>),
    /// Randomly generated bytes of the given length; in Yubico mode the
    /// first byte is pinned to `0xff` to keep the id out of the assigned
    /// prefix ranges
    Random(usize),
}

/// Enrollment parameters for one slot
#[derive(Debug, Clone)]
pub struct EnrollRequest {
    /// Programming mode
    pub mode: TokenMode,
    /// Slot to program
    pub slot: u8,
    /// OTP width in OATH mode
    pub digits: OtpDigits,
    /// Send a carriage return after the OTP output
    pub append_cr: bool,
    /// Use HMAC challenge-response instead of keypress output (OATH only)
    pub challenge_response: bool,
    /// Public id selection
    pub public_id: PublicId,
    /// Current access key, required if the device configuration is locked
    pub access_key: Option<[u8; ACCESS_KEY_LENGTH]>,
    /// New access key to set while programming
    pub new_access_key: Option<[u8; ACCESS_KEY_LENGTH]>,
}

impl EnrollRequest {
    /// Enrollment defaults for a mode: slot 1, append CR, and the public id
    /// the original tooling picks (6 random bytes in Yubico mode, none
    /// otherwise)
    pub fn new(mode: TokenMode) -> Self {
        let public_id = match mode {
            TokenMode::Yubico => PublicId::Random(6),
            TokenMode::Oath | TokenMode::Static => PublicId::None,
        };
        Self {
            mode,
            slot: 1,
            digits: OtpDigits::Six,
            append_cr: true,
            challenge_response: false,
            public_id,
            access_key: None,
            new_access_key: None,
        }
    }
}

/// Slot configuration handed to a [HardwareTokenDriver]
///
/// Raw material only; rendering (hex key, modhex public id) happens in the
/// [Enrollment] returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Programming mode
    pub mode: TokenMode,
    /// Generated key material, [TokenMode::key_length] bytes
    pub key: Vec<u8>,
    /// Private uid, Yubico mode only
    pub private_uid: Option<[u8; UID_LENGTH]>,
    /// OTP width in OATH mode
    pub digits: OtpDigits,
    /// Public id bytes, possibly empty
    pub public_id: Vec<u8>,
    /// Send a carriage return after the OTP output
    pub append_cr: bool,
    /// Use HMAC challenge-response instead of keypress output
    pub challenge_response: bool,
    /// Emit the static password instead of a moving ticket
    pub static_ticket: bool,
    /// Expose the serial number over the API
    pub serial_api_visible: bool,
    /// Current access key to unlock the device configuration
    pub access_key: Option<[u8; ACCESS_KEY_LENGTH]>,
    /// New access key to set
    pub new_access_key: Option<[u8; ACCESS_KEY_LENGTH]>,
}

/// Abstract hardware token driver
///
/// Concrete drivers (USB HID, smart card) are external collaborators; this
/// crate only ever talks to the capability.
pub trait HardwareTokenDriver {
    /// Error type of the underlying device binding
    type Error;

    /// The device serial number
    fn serial(&mut self) -> Result<u32, Self::Error>;

    /// The device firmware version as `(major, minor, patch)`
    fn firmware_version(&mut self) -> Result<(u8, u8, u8), Self::Error>;

    /// Write a slot configuration to the device
    fn write_config(&mut self, config: &TokenConfig, slot: u8) -> Result<(), Self::Error>;
}

/// Error type for enrollment
#[derive(Debug, thiserror::Error)]
pub enum EnrollError<E> {
    /// The device firmware is older than 2.1
    #[error("firmware {0}.{1}.{2} is too old, 2.1 or later is required")]
    FirmwareTooOld(u8, u8, u8),
    /// Challenge-response was requested in a mode that does not support it
    #[error("challenge-response is only supported in OATH mode")]
    ChallengeResponseUnsupported,
    /// The device driver failed
    #[error("hardware driver failure: {0}")]
    Driver(E),
}

/// Result of a successful enrollment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    /// The device serial, zero-padded to 8 digits
    pub serial: String,
    /// The generated key material, hex encoded, to be submitted to the
    /// authentication service by the caller
    pub otp_key_hex: String,
    /// The programmed public id, modhex encoded; empty if none was set
    pub public_id: String,
}

/// Generate key material for `request` and program it onto the token
///
/// Key material is generated freshly here, handed to the driver, and
/// returned to the caller for submission to the authentication service;
/// nothing is retained. Firmware older than 2.1 is rejected before the
/// device is touched.
pub fn enroll<D: HardwareTokenDriver>(
    driver: &mut D,
    request: &EnrollRequest,
) -> Result<Enrollment, EnrollError<D::Error>> {
    let (major, minor, patch) = driver.firmware_version().map_err(EnrollError::Driver)?;
    if major < 2 || (major == 2 && minor == 0) {
        return Err(EnrollError::FirmwareTooOld(major, minor, patch));
    }
    if request.challenge_response && request.mode != TokenMode::Oath {
        return Err(EnrollError::ChallengeResponseUnsupported);
    }
    let serial = driver.serial().map_err(EnrollError::Driver)?;
    let serial = format!("{serial:08}");

    let mut key = vec![0u8; request.mode.key_length()];
    rand::rng().fill(&mut key[..]);

    let private_uid = match request.mode {
        TokenMode::Yubico => {
            let mut uid = [0u8; UID_LENGTH];
            rand::rng().fill(&mut uid);
            Some(uid)
        }
        TokenMode::Oath | TokenMode::Static => None,
    };

    let public_id = resolve_public_id(&request.public_id, request.mode, &serial);

    let config = TokenConfig {
        mode: request.mode,
        key: key.clone(),
        private_uid,
        digits: request.digits,
        public_id: public_id.clone(),
        append_cr: request.append_cr,
        challenge_response: request.challenge_response,
        static_ticket: request.mode == TokenMode::Static,
        serial_api_visible: true,
        access_key: request.access_key,
        new_access_key: request.new_access_key,
    };
    debug!(serial = %serial, mode = ?request.mode, slot = request.slot, "writing token configuration");
    driver
        .write_config(&config, request.slot)
        .map_err(EnrollError::Driver)?;

    Ok(Enrollment {
        serial,
        otp_key_hex: hex::encode(&key),
        public_id: modhex_encode(&public_id),
    })
}

fn resolve_public_id(choice: &PublicId, mode: TokenMode, serial: &str) -> Vec<u8> {
    match choice {
        PublicId::None => Vec::new(),
        PublicId::Serial => serial.as_bytes().to_vec(),
        PublicId::Fixed(bytes) => bytes.clone(),
        PublicId::Random(0) => Vec::new(),
        PublicId::Random(length) => {
            let mut id = vec![0u8; *length];
            rand::rng().fill(&mut id[..]);
            if mode == TokenMode::Yubico {
                id[0] = 0xff;
            }
            id
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn modhex_known_value() {
        assert_eq!(modhex_encode(b"test"), "ifhgieif");
        assert_eq!(modhex_encode(&[]), "");
        assert_eq!(modhex_encode(&[0x00, 0xff]), "ccvv");
    }

    #[test]
    fn static_password_is_deterministic() {
        let key = StaticKey::try_from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        let first = derive_static_password(&key);
        let second = derive_static_password(&key);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2 * STATIC_KEY_LENGTH);
        assert!(first.bytes().all(|b| MODHEX_ALPHABET.contains(&b)));
    }

    #[test]
    fn static_password_depends_on_the_key() {
        let a = StaticKey::new([0u8; STATIC_KEY_LENGTH]);
        let b = StaticKey::new([1u8; STATIC_KEY_LENGTH]);
        assert_ne!(derive_static_password(&a), derive_static_password(&b));
    }

    #[test]
    fn static_key_hex_parsing() {
        assert!(StaticKey::try_from_hex("00112233445566778899aabbccddeeff").is_ok());
        // wrong length
        assert!(matches!(
            StaticKey::try_from_hex("0011"),
            Err(StaticKeyError::InvalidKey)
        ));
        // not hex
        assert!(matches!(
            StaticKey::try_from_hex("zz112233445566778899aabbccddeezz"),
            Err(StaticKeyError::InvalidKey)
        ));
    }

    #[derive(Default)]
    struct FakeDriver {
        firmware: (u8, u8, u8),
        written: Vec<(TokenConfig, u8)>,
    }

    impl HardwareTokenDriver for FakeDriver {
        type Error = std::io::Error;

        fn serial(&mut self) -> Result<u32, Self::Error> {
            Ok(1234567)
        }

        fn firmware_version(&mut self) -> Result<(u8, u8, u8), Self::Error> {
            Ok(self.firmware)
        }

        fn write_config(&mut self, config: &TokenConfig, slot: u8) -> Result<(), Self::Error> {
            self.written.push((config.clone(), slot));
            Ok(())
        }
    }

    fn driver() -> FakeDriver {
        FakeDriver {
            firmware: (2, 2, 0),
            ..FakeDriver::default()
        }
    }

    #[test]
    fn enroll_oath_writes_a_20_byte_key() {
        let mut driver = driver();
        let enrollment = enroll(&mut driver, &EnrollRequest::new(TokenMode::Oath)).unwrap();

        assert_eq!(enrollment.serial, "01234567");
        assert_eq!(enrollment.otp_key_hex.len(), 40);
        assert_eq!(enrollment.public_id, "");

        let (config, slot) = &driver.written[0];
        assert_eq!(*slot, 1);
        assert_eq!(config.key.len(), 20);
        assert_eq!(hex::encode(&config.key), enrollment.otp_key_hex);
        assert!(config.private_uid.is_none());
        assert!(!config.static_ticket);
        assert!(config.serial_api_visible);
    }

    #[test]
    fn enroll_yubico_sets_uid_and_random_public_id() {
        let mut driver = driver();
        let enrollment = enroll(&mut driver, &EnrollRequest::new(TokenMode::Yubico)).unwrap();

        let (config, _) = &driver.written[0];
        assert_eq!(config.key.len(), 16);
        assert!(config.private_uid.is_some());
        assert_eq!(config.public_id.len(), 6);
        assert_eq!(config.public_id[0], 0xff);
        // modhex of 6 bytes is 12 symbols, starting with 0xff -> "vv"
        assert_eq!(enrollment.public_id.len(), 12);
        assert!(enrollment.public_id.starts_with("vv"));
    }

    #[test]
    fn enroll_static_sets_the_static_ticket_flag() {
        let mut driver = driver();
        enroll(&mut driver, &EnrollRequest::new(TokenMode::Static)).unwrap();
        let (config, _) = &driver.written[0];
        assert!(config.static_ticket);
        assert_eq!(config.key.len(), 16);
    }

    #[test]
    fn serial_public_id_uses_the_decimal_digits() {
        let mut driver = driver();
        let mut request = EnrollRequest::new(TokenMode::Oath);
        request.public_id = PublicId::Serial;
        let enrollment = enroll(&mut driver, &request).unwrap();
        assert_eq!(enrollment.public_id, modhex_encode(b"01234567"));
    }

    #[test]
    fn old_firmware_is_rejected_before_writing() {
        let mut driver = FakeDriver {
            firmware: (2, 0, 4),
            ..FakeDriver::default()
        };
        let result = enroll(&mut driver, &EnrollRequest::new(TokenMode::Oath));
        assert!(matches!(result, Err(EnrollError::FirmwareTooOld(2, 0, 4))));
        assert!(driver.written.is_empty());
    }

    #[test]
    fn challenge_response_outside_oath_is_rejected() {
        let mut driver = driver();
        let mut request = EnrollRequest::new(TokenMode::Yubico);
        request.challenge_response = true;
        assert!(matches!(
            enroll(&mut driver, &request),
            Err(EnrollError::ChallengeResponseUnsupported)
        ));
        assert!(driver.written.is_empty());
    }
}
