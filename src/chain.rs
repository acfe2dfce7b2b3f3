use crate::hotp::{HotpSecret, OtpDigits, OtpError};
use crate::salted_hash;
use crate::store::AuthItem;
use compact_str::CompactString;
use tracing::debug;

/// Precomputes batches of salted future-OTP hashes for one identity
///
/// The produced [AuthItem]s let a host verify OTP values offline without
/// holding the secret: the secret is borrowed only for the duration of
/// [ChainBuilder::build] and nothing derived from it beyond the salted
/// hashes leaves the call.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    identity: CompactString,
    token_owner: CompactString,
}

impl ChainBuilder {
    /// Create a builder for one identity
    ///
    /// - `identity`: the local identity the chain authenticates
    /// - `token_owner`: the owner of the token the secret belongs to
    pub fn new(identity: impl Into<CompactString>, token_owner: impl Into<CompactString>) -> Self {
        Self {
            identity: identity.into(),
            token_owner: token_owner.into(),
        }
    }

    /// Precompute salted hashes for counters `[start_counter, start_counter + count)`
    ///
    /// Returns the full batch; handing it to
    /// [crate::store::OfflineStore::append] keeps the insert all-or-nothing,
    /// so a failure cannot leave a gap in the counter sequence.
    pub fn build(
        &self,
        secret: &HotpSecret,
        start_counter: u64,
        count: u64,
        digits: OtpDigits,
    ) -> Result<Vec<AuthItem>, OtpError> {
        let end = start_counter
            .checked_add(count)
            .ok_or(OtpError::CounterOverflow)?;

        let mut items = Vec::with_capacity(count as usize);
        for counter in start_counter..end {
            let otp = secret.generate(counter, digits)?;
            let digest = salted_hash::hash(otp.as_bytes());
            items.push(AuthItem {
                counter,
                identity: self.identity.clone(),
                token_owner: self.token_owner.clone(),
                digest,
            });
        }
        debug!(
            identity = %self.identity,
            start_counter,
            count,
            "precomputed offline chain"
        );
        Ok(items)
    }
}
