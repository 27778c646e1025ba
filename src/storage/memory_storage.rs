use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{ProfileError, Result};
use crate::profile::{CharacterProfile, ProfileId};
use crate::storage::ProfileStorage;

/// Profile storage that lives in memory only.
///
/// Records can be planted in their serialized form to simulate files
/// written by somebody else, and writes can be made to fail on purpose.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    label: String,
    records: BTreeMap<ProfileId, String>,
    last_assigned: ProfileId,
    failing: BTreeSet<ProfileId>,
    fail_new: bool,
    saves: usize,
    deletes: usize,
}

impl MemoryStorage {
    pub fn new(label: String) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }

    /// Store a profile as if it had been written externally.
    pub fn plant(&mut self, profile: &CharacterProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        self.plant_raw(profile.unique_id, json);
        Ok(())
    }

    /// Store raw record contents under the given identity.
    pub fn plant_raw(&mut self, id: ProfileId, contents: impl Into<String>) {
        self.last_assigned = self.last_assigned.max(id);
        self.records.insert(id, contents.into());
    }

    /// Make every following save or delete of `id` fail
    pub fn fail_on(&mut self, id: ProfileId) {
        self.failing.insert(id);
    }

    /// Make every following save of a brand new profile fail
    pub fn fail_new_profiles(&mut self, fail: bool) {
        self.fail_new = fail;
    }

    pub fn contains(&self, id: ProfileId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Parse the stored record of `id`
    pub fn stored(&self, id: ProfileId) -> Option<CharacterProfile> {
        self.load(&id).ok()
    }

    /// Number of successful saves so far
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Number of successful deletes so far
    pub fn deletes(&self) -> usize {
        self.deletes
    }

    fn check(&self, id: ProfileId) -> Result<()> {
        if self.failing.contains(&id) || (id.is_new() && self.fail_new) {
            return Err(ProfileError::Storage(
                self.label.clone(),
                format!("Refusing to touch profile {}", id),
            ));
        }
        Ok(())
    }
}

impl ProfileStorage for MemoryStorage {
    type Location = ProfileId;

    fn enumerate(&self) -> Result<Vec<ProfileId>> {
        Ok(self.records.keys().copied().collect())
    }

    fn load(&self, location: &ProfileId) -> Result<CharacterProfile> {
        let record = self.records.get(location).ok_or_else(|| {
            ProfileError::Storage(self.label.clone(), "Key not found".to_owned())
        })?;
        let mut profile: CharacterProfile = serde_json::from_str(record)?;
        profile.unique_id = *location;
        Ok(profile)
    }

    fn save(&mut self, profile: &mut CharacterProfile) -> Result<()> {
        self.check(profile.unique_id)?;
        if profile.unique_id.is_new() {
            self.last_assigned = self.last_assigned.next().ok_or_else(|| {
                ProfileError::Storage(
                    self.label.clone(),
                    "identity space exhausted".to_owned(),
                )
            })?;
            profile.unique_id = self.last_assigned;
        }

        let json = serde_json::to_string(profile)?;
        self.records.insert(profile.unique_id, json);
        self.saves += 1;
        log::debug!("{}: saved {}", self.label, profile);
        Ok(())
    }

    fn delete(&mut self, profile: &CharacterProfile) -> Result<()> {
        self.check(profile.unique_id)?;
        if self.records.remove(&profile.unique_id).is_some() {
            self.deletes += 1;
            log::debug!("{}: deleted {}", self.label, profile);
        }
        Ok(())
    }
}
