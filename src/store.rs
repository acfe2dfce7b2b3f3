use crate::salted_hash::SaltedDigest;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// One precomputed, hashed future OTP value for one identity
///
/// Items are created by [crate::chain::ChainBuilder], consumed (deleted) by
/// [crate::verifier::OfflineVerifier] and never mutated in between. The
/// serialized shape mirrors the persisted `authitems` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthItem {
    /// Position of the hashed OTP in the sequence for its secret
    pub counter: u64,
    /// The local identity this item authenticates
    pub identity: CompactString,
    /// The owner of the token the chain was derived from
    pub token_owner: CompactString,
    /// Salted hash of the OTP value; the OTP itself is not stored
    pub digest: SaltedDigest,
}

/// Error type for offline store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An appended counter already exists for the identity
    #[error("counter {counter} already exists for identity {identity}")]
    DuplicateCounter {
        /// The partition the collision happened in
        identity: CompactString,
        /// The colliding counter value
        counter: u64,
    },
    /// The backing file could not be read or written
    #[error("failed to access the offline store: {0}")]
    Storage(#[from] std::io::Error),
    /// The backing file does not hold a valid store document
    #[error("offline store document is not valid: {0}")]
    Format(#[from] serde_json::Error),
}

type Partitions = HashMap<CompactString, BTreeMap<u64, AuthItem>>;

/// Ordered, per-identity collection of precomputed [AuthItem]s
///
/// Within a partition counters are unique and iteration is in ascending
/// counter order. All mutations are staged and committed as a unit: a
/// rejected or failed operation leaves both the in-memory state and the
/// backing file untouched.
#[derive(Debug)]
pub struct OfflineStore {
    inner: Mutex<Partitions>,
    path: Option<PathBuf>,
}

impl Default for OfflineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Partitions::new()),
            path: None,
        }
    }

    /// Open a file-backed store
    ///
    /// Loads the JSON document at `path` if it exists; a missing file is an
    /// empty store. Every successful mutation rewrites the file through a
    /// temporary sibling and an atomic rename.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let partitions = match std::fs::read_to_string(&path) {
            Ok(document) => {
                let items: Vec<AuthItem> = serde_json::from_str(&document)?;
                let mut partitions = Partitions::new();
                for item in items {
                    partitions
                        .entry(item.identity.clone())
                        .or_default()
                        .insert(item.counter, item);
                }
                partitions
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Partitions::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            inner: Mutex::new(partitions),
            path: Some(path),
        })
    }

    /// Atomically insert a batch of items
    ///
    /// Fails with [StoreError::DuplicateCounter] if any item's counter is
    /// already present for its identity, in which case nothing is inserted.
    pub fn append(&self, items: &[AuthItem]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for item in items {
            let occupied = inner
                .get(&item.identity)
                .is_some_and(|partition| partition.contains_key(&item.counter));
            if occupied {
                return Err(StoreError::DuplicateCounter {
                    identity: item.identity.clone(),
                    counter: item.counter,
                });
            }
        }

        let mut staged = inner.clone();
        for item in items {
            // duplicates inside the batch itself collide here
            let previous = staged
                .entry(item.identity.clone())
                .or_default()
                .insert(item.counter, item.clone());
            if previous.is_some() {
                return Err(StoreError::DuplicateCounter {
                    identity: item.identity.clone(),
                    counter: item.counter,
                });
            }
        }
        self.persist(&staged)?;
        *inner = staged;
        debug!(count = items.len(), "appended auth items");
        Ok(())
    }

    /// Return up to `max` items for `identity`, lowest counter first
    pub fn window(&self, identity: &str, max: usize) -> Vec<AuthItem> {
        let inner = self.lock();
        inner
            .get(identity)
            .map(|partition| partition.values().take(max).cloned().collect())
            .unwrap_or_default()
    }

    /// Atomically delete every item for `identity` with a counter `<= counter`
    pub fn prune_up_to(&self, identity: &str, counter: u64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.contains_key(identity) {
            return Ok(());
        }
        let mut staged = inner.clone();
        Self::prune_partition(&mut staged, identity, counter);
        self.persist(&staged)?;
        *inner = staged;
        debug!(identity, counter, "pruned auth items");
        Ok(())
    }

    /// Scan a window and consume the first matching item in one critical
    /// section
    ///
    /// Scans up to `window` items for `identity` in ascending counter order.
    /// The first item for which `predicate` returns `true` is removed
    /// together with every lower-counter item in the partition, and
    /// returned. Without a match the store is not touched. Holding the lock
    /// across scan and prune is what keeps concurrent checks for the same
    /// identity from consuming one item twice.
    pub fn take_matching<F>(
        &self,
        identity: &str,
        window: usize,
        mut predicate: F,
    ) -> Result<Option<AuthItem>, StoreError>
    where
        F: FnMut(&AuthItem) -> bool,
    {
        let mut inner = self.lock();
        let Some(partition) = inner.get(identity) else {
            return Ok(None);
        };
        let Some(item) = partition
            .values()
            .take(window)
            .find(|item| predicate(item))
            .cloned()
        else {
            return Ok(None);
        };

        let mut staged = inner.clone();
        Self::prune_partition(&mut staged, identity, item.counter);
        self.persist(&staged)?;
        *inner = staged;
        Ok(Some(item))
    }

    fn prune_partition(partitions: &mut Partitions, identity: &str, counter: u64) {
        let Some(partition) = partitions.get_mut(identity) else {
            return;
        };
        *partition = match counter.checked_add(1) {
            Some(first_kept) => partition.split_off(&first_kept),
            None => BTreeMap::new(),
        };
        if partition.is_empty() {
            partitions.remove(identity);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Partitions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the staged state to the backing file, temp-then-rename
    fn persist(&self, partitions: &Partitions) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut items: Vec<&AuthItem> = partitions
            .values()
            .flat_map(|partition| partition.values())
            .collect();
        items.sort_by(|a, b| (&a.identity, a.counter).cmp(&(&b.identity, b.counter)));
        let document = serde_json::to_string_pretty(&items)?;

        let tmp = temp_sibling(path);
        std::fs::write(&tmp, document)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
