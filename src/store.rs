use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{flag::Flag, Result};

/// Source of flag definitions.
///
/// Each call must return structurally complete flags. Different calls may observe different
/// versions of the flag set.
pub trait FlagStore {
    fn get_flag(&self, key: &str) -> Option<Arc<Flag>>;

    fn get_all_flags(&self) -> HashMap<String, Arc<Flag>>;
}

/// A serialized set of flags, keyed by flag key.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagSet {
    flags: HashMap<String, TryParse<Flag>>,
}

impl FlagSet {
    /// Parse a flag set from JSON.
    ///
    /// Individual flags that fail to parse are dropped with a warning instead of failing the whole
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFlagSet`](crate::Error::InvalidFlagSet) if the document itself is
    /// not a flag set.
    pub fn from_json(json: &[u8]) -> Result<FlagSet> {
        Ok(serde_json::from_slice(json)?)
    }

    fn into_flags(self) -> HashMap<String, Arc<Flag>> {
        self.flags
            .into_iter()
            .filter_map(|(key, flag)| match flag {
                TryParse::Parsed(flag) => Some((key, Arc::new(flag))),
                TryParse::ParseFailed(_) => {
                    log::warn!(target: "flagvisor", flag_key:display = key; "dropping flag that failed to parse");
                    None
                }
            })
            .collect()
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        FlagSet {
            flags: iter
                .into_iter()
                .map(|flag| (flag.key.clone(), TryParse::Parsed(flag)))
                .collect(),
        }
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum TryParse<T> {
    Parsed(T),
    ParseFailed(serde_json::Value),
}

/// `InMemoryFlagStore` provides a Sync storage for flags that allows concurrent access for readers
/// and writers.
///
/// Writers replace the whole flag set, so readers always see a consistent snapshot.
#[derive(Debug, Default)]
pub struct InMemoryFlagStore {
    flags: RwLock<Arc<HashMap<String, Arc<Flag>>>>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `flags`.
    pub fn with_flags(flags: impl IntoIterator<Item = Flag>) -> Self {
        let store = Self::new();
        store.set_flags(flags.into_iter().collect());
        store
    }

    /// Create a store from a JSON flag set. See [`FlagSet::from_json`].
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let store = Self::new();
        store.set_flags(FlagSet::from_json(json)?);
        Ok(store)
    }

    fn snapshot(&self) -> Arc<HashMap<String, Arc<Flag>>> {
        // A poisoned lock means a writer panicked while swapping the pointer, which leaves the
        // previous snapshot intact, so it is safe to keep reading it.
        match self.flags.read() {
            Ok(flags) => flags.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace all flags, returning the previous set.
    pub fn set_flags(&self, flags: FlagSet) -> Arc<HashMap<String, Arc<Flag>>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Arc::new(flags.into_flags());

        let mut slot = match self.flags.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, new_value)
    }

    /// Insert or replace a single flag.
    pub fn upsert_flag(&self, flag: Flag) {
        let mut slot = match self.flags.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut flags = HashMap::clone(&slot);
        flags.insert(flag.key.clone(), Arc::new(flag));
        *slot = Arc::new(flags);
    }

    /// Remove a flag, returning it if it was present.
    pub fn remove_flag(&self, key: &str) -> Option<Arc<Flag>> {
        let mut slot = match self.flags.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut flags = HashMap::clone(&slot);
        let removed = flags.remove(key);
        *slot = Arc::new(flags);
        removed
    }
}

impl FlagStore for InMemoryFlagStore {
    fn get_flag(&self, key: &str) -> Option<Arc<Flag>> {
        self.snapshot().get(key).cloned()
    }

    fn get_all_flags(&self) -> HashMap<String, Arc<Flag>> {
        HashMap::clone(&self.snapshot())
    }
}
