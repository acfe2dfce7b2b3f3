use crate::salted_hash;
use crate::store::{OfflineStore, StoreError};
use tracing::debug;

/// Outcome of an offline check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checked {
    /// The candidate matched a stored item at this counter
    Matched {
        /// Counter of the consumed item
        counter: u64,
    },
    /// No item in the window matched; a normal negative result, the caller
    /// may fall back to online verification or rebuild the chain
    NotFound,
}

/// Verifies candidate OTP values against precomputed chains
///
/// Works entirely from the salted hashes in the store; the secret the chain
/// was derived from is never needed here.
#[derive(Debug, Clone, Copy)]
pub struct OfflineVerifier<'a> {
    store: &'a OfflineStore,
    window_size: usize,
}

impl<'a> OfflineVerifier<'a> {
    /// Create a verifier over `store` scanning up to `window_size` items per
    /// check
    pub fn new(store: &'a OfflineStore, window_size: usize) -> Self {
        Self { store, window_size }
    }

    /// Check a candidate OTP for `identity`
    ///
    /// Scans the window in ascending counter order. The first item whose
    /// digest verifies is consumed together with every lower-counter item:
    /// skipped values were displayed but never used, and must not remain
    /// replayable. A miss leaves the store untouched so a later-arriving
    /// legitimate value can still be checked.
    ///
    /// A depleted chain simply yields [Checked::NotFound]; it signals that
    /// the chain needs to be rebuilt, not a verifier failure.
    pub fn check(&self, identity: &str, candidate: &str) -> Result<Checked, StoreError> {
        let matched = self.store.take_matching(identity, self.window_size, |item| {
            salted_hash::verify(candidate.as_bytes(), &item.digest)
        })?;
        match matched {
            Some(item) => {
                debug!(identity, counter = item.counter, "offline check matched");
                Ok(Checked::Matched {
                    counter: item.counter,
                })
            }
            None => {
                debug!(identity, "offline check found no match");
                Ok(Checked::NotFound)
            }
        }
    }
}
