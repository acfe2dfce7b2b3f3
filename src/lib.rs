#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc = include_str!("../README.md")]

/// HOTP (HMAC-based One-Time Password) generation
pub mod hotp;

/// TOTP (Time-based One-Time Password) generation
pub mod totp;

/// Salted one-way digests for storing future OTP values
pub mod salted_hash;

/// Precomputation of salted OTP chains for offline verification
pub mod chain;

/// Ordered, per-identity store of precomputed auth items
pub mod store;

/// Windowed offline verification with prune-on-match replay prevention
pub mod verifier;

/// YubiKey static-password derivation, modhex and enrollment
pub mod yubikey;
