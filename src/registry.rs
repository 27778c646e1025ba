use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::conversion::PendingConversions;
use crate::errors::{ProfileError, Result};
use crate::profile::{CharacterProfile, ProfileId};
use crate::storage::ProfileStorage;

/// Registry of character profiles backed by a [`ProfileStorage`].
///
/// [`ProfileRegistry`] owns the canonical set of profiles, at most one
/// working copy opened for editing, and the temporary per-character
/// overrides supplied from outside. Every change of persisted state is
/// written through to the storage before the in-memory set is touched,
/// so a failed write leaves the registry as it was.
///
/// #### Set API
/// - [`ProfileRegistry::load_all`] / [`ProfileRegistry::discover_new`]:
///   (re)read profiles from the storage.
/// - [`ProfileRegistry::add_or_replace`], [`ProfileRegistry::delete`],
///   [`ProfileRegistry::save_all`].
/// - [`ProfileRegistry::enable`]: at most one enabled profile per
///   character.
///
/// #### Editing API
/// - [`ProfileRegistry::begin_edit`] opens a detached working copy,
///   [`ProfileRegistry::commit_edit`] writes it back,
///   [`ProfileRegistry::revert`] restores it from the canonical profile and
///   [`ProfileRegistry::end_edit`] closes the session.
///
/// #### Resolution API
/// - [`ProfileRegistry::enabled_profiles`]: snapshot of every profile that
///   is active right now, temporary overrides and the working copy
///   included.
///
/// ## Examples
/// ```no_run
/// use std::path::Path;
/// use bone_profiles::{FolderStorage, ProfileRegistry};
///
/// let storage = FolderStorage::in_root("profiles".to_owned(), Path::new("path/to/config"));
/// let mut registry = ProfileRegistry::new(storage);
/// registry.load_all();
///
/// for profile in registry.enabled_profiles() {
///     println!("{} is active", profile);
/// }
/// ```
pub struct ProfileRegistry<S: ProfileStorage> {
    storage: S,
    profiles: BTreeMap<ProfileId, CharacterProfile>,
    editor: Option<CharacterProfile>,
    temporary: BTreeMap<String, CharacterProfile>,
    pending: PendingConversions,
}

impl<S: ProfileStorage> ProfileRegistry<S> {
    pub fn new(storage: S) -> Self {
        Self::with_conversions(storage, PendingConversions::new())
    }

    /// Create a registry that will also take over the given converted
    /// profiles on [`ProfileRegistry::process_pending_conversions`].
    pub fn with_conversions(storage: S, pending: PendingConversions) -> Self {
        Self {
            storage,
            profiles: BTreeMap::new(),
            editor: None,
            temporary: BTreeMap::new(),
            pending,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, id: ProfileId) -> Option<&CharacterProfile> {
        self.profiles.get(&id)
    }

    /// Canonical profiles ordered by identity
    pub fn profiles(&self) -> impl Iterator<Item = &CharacterProfile> {
        self.profiles.values()
    }

    pub fn profiles_for<'a>(
        &'a self,
        char_name: &'a str,
    ) -> impl Iterator<Item = &'a CharacterProfile> + 'a {
        self.profiles
            .values()
            .filter(move |p| p.char_name == char_name)
    }

    /// The enabled canonical profile of a character, if any
    pub fn enabled_for(&self, char_name: &str) -> Option<&CharacterProfile> {
        self.profiles
            .values()
            .find(|p| p.enabled && p.char_name == char_name)
    }

    /// Replace the whole canonical set with what the storage holds.
    ///
    /// Records which fail to load are skipped. Returns the number of
    /// loaded profiles.
    pub fn load_all(&mut self) -> usize {
        let locations = match self.storage.enumerate() {
            Ok(locations) => locations,
            Err(err) => {
                log::warn!("Failed to enumerate stored profiles: {}", err);
                return 0;
            }
        };

        self.profiles.clear();
        let mut loaded = 0;
        for location in locations {
            if let Some(profile) = self.load_one(&location) {
                self.track(profile);
                loaded += 1;
            }
        }

        log::info!("{} profiles loaded", loaded);
        loaded
    }

    /// Pick up profiles which appeared in the storage since the last load.
    ///
    /// Profiles already in memory are left untouched, even if their stored
    /// form changed. Returns the number of added profiles.
    pub fn discover_new(&mut self) -> usize {
        let locations = match self.storage.enumerate() {
            Ok(locations) => locations,
            Err(err) => {
                log::warn!("Failed to enumerate stored profiles: {}", err);
                return 0;
            }
        };

        let mut discovered = 0;
        for location in locations {
            let Some(profile) = self.load_one(&location) else {
                continue;
            };
            if self.profiles.contains_key(&profile.unique_id) {
                continue;
            }
            log::debug!("Discovered profile {}", profile);
            self.track(profile);
            discovered += 1;
        }

        if discovered > 0 {
            log::info!("{} new profiles discovered", discovered);
        }
        discovered
    }

    fn load_one(&self, location: &S::Location) -> Option<CharacterProfile> {
        let mut profile = match self.storage.load(location) {
            Ok(profile) => profile,
            Err(err) => {
                log::warn!("Skipping unreadable profile record: {}", err);
                return None;
            }
        };

        if profile.unique_id.is_new() {
            log::warn!("Skipping stored profile {} without identity", profile);
            return None;
        }

        profile.prune_idempotent_transforms();
        Some(profile)
    }

    /// Insert a loaded profile, keeping the last enabled one per character
    fn track(&mut self, profile: CharacterProfile) {
        let id = profile.unique_id;
        let enabled = profile.enabled;
        self.profiles.insert(id, profile);
        if enabled {
            self.enforce_exclusivity(id);
        }
    }

    /// Disable every other profile of the same character as `id`.
    /// Returns the identities of the profiles that were switched off.
    fn enforce_exclusivity(&mut self, id: ProfileId) -> Vec<ProfileId> {
        let Some(char_name) = self.profiles.get(&id).map(|p| p.char_name.clone())
        else {
            return vec![];
        };

        let mut disabled = vec![];
        for other in self.profiles.values_mut() {
            if other.unique_id != id && other.enabled && other.char_name == char_name {
                other.enabled = false;
                disabled.push(other.unique_id);
            }
        }

        if !disabled.is_empty() {
            log::debug!(
                "Enabling profile {} of {} disabled {:?}",
                id,
                char_name,
                disabled
            );
        }
        disabled
    }

    /// Enforce exclusivity for `id` and write the switched-off siblings.
    /// A sibling that fails to persist stays disabled in memory.
    fn disable_siblings(&mut self, id: ProfileId) {
        for sibling in self.enforce_exclusivity(id) {
            if let Some(profile) = self.profiles.get_mut(&sibling) {
                if let Err(err) = self.storage.save(profile) {
                    log::warn!("Failed to persist disabled profile {}: {}", profile, err);
                }
            }
        }
    }

    /// Persist `profile` and make it part of the canonical set.
    ///
    /// A profile whose identity is already tracked replaces the tracked one,
    /// keeping its creation date. Otherwise, or with `force_new`, it is
    /// registered as a brand new profile and the storage assigns it an
    /// identity. Unedited bones are dropped first.
    pub fn add_or_replace(
        &mut self,
        mut profile: CharacterProfile,
        force_new: bool,
    ) -> Result<ProfileId> {
        profile.prune_idempotent_transforms();
        if force_new {
            profile.unique_id = ProfileId::NEW;
        }

        let now = SystemTime::now();
        let existing = if profile.unique_id.is_new() {
            None
        } else {
            self.profiles.get(&profile.unique_id)
        };
        match existing {
            Some(existing) => {
                profile.creation_date = existing.creation_date;
                profile.modified_date = now;
            }
            None => {
                profile.creation_date = now;
                profile.modified_date = now;
            }
        }

        self.storage.save(&mut profile)?;
        if profile.unique_id.is_new() {
            return Err(ProfileError::MissingIdentity(profile.char_name));
        }

        let id = profile.unique_id;
        let enabled = profile.enabled;
        log::debug!("Profile {} stored", profile);
        self.profiles.insert(id, profile);
        if enabled {
            self.disable_siblings(id);
        }
        Ok(id)
    }

    /// Remove a profile from the set and from the storage.
    ///
    /// Returns `Ok(false)` if there was no such profile.
    pub fn delete(&mut self, id: ProfileId) -> Result<bool> {
        let Some(profile) = self.profiles.get(&id) else {
            return Ok(false);
        };

        self.storage.delete(profile)?;
        if let Some(profile) = self.profiles.remove(&id) {
            log::info!("Profile {} deleted", profile);
        }
        Ok(true)
    }

    /// Prune and persist every tracked profile.
    ///
    /// Failures are logged and do not stop the remaining saves. Returns the
    /// number of profiles written.
    pub fn save_all(&mut self) -> usize {
        let mut saved = 0;
        for profile in self.profiles.values_mut() {
            profile.prune_idempotent_transforms();
            match self.storage.save(profile) {
                Ok(()) => saved += 1,
                Err(err) => {
                    log::warn!("Failed to save profile {}: {}", profile, err)
                }
            }
        }
        log::info!("{} of {} profiles saved", saved, self.profiles.len());
        saved
    }

    /// Enable a profile and disable every other profile of its character.
    ///
    /// Returns `Ok(false)` if there is no such profile.
    pub fn enable(&mut self, id: ProfileId) -> Result<bool> {
        if !self.set_enabled(id, true)? {
            return Ok(false);
        }
        self.disable_siblings(id);
        Ok(true)
    }

    /// Disable a profile. Other profiles are not affected.
    pub fn disable(&mut self, id: ProfileId) -> Result<bool> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&mut self, id: ProfileId, enabled: bool) -> Result<bool> {
        let Some(existing) = self.profiles.get(&id) else {
            return Ok(false);
        };
        if existing.enabled == enabled {
            return Ok(true);
        }

        let mut updated = existing.clone();
        updated.enabled = enabled;
        self.storage.save(&mut updated)?;
        self.profiles.insert(id, updated);
        Ok(true)
    }

    /// The working copy of the open editing session
    pub fn editor(&self) -> Option<&CharacterProfile> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut CharacterProfile> {
        self.editor.as_mut()
    }

    pub fn is_editing(&self, id: ProfileId) -> bool {
        self.editor
            .as_ref()
            .map_or(false, |copy| copy.unique_id == id)
    }

    /// Open an editing session on a fresh detached copy of profile `id`.
    ///
    /// Whatever session was open before is replaced, including one on the
    /// same profile, and its uncommitted changes are lost. Returns `None` if
    /// there is no such profile, leaving the open session alone.
    pub fn begin_edit(&mut self, id: ProfileId) -> Option<&mut CharacterProfile> {
        let mut copy = self.profiles.get(&id)?.clone();
        copy.prune_idempotent_transforms();
        log::debug!("Editing session opened for {}", copy);
        self.editor = Some(copy);
        self.editor.as_mut()
    }

    /// Write the working copy back into the canonical set and the storage.
    ///
    /// Returns `Ok(false)` if no session is open.
    pub fn commit_edit(&mut self, finish_editing: bool) -> Result<bool> {
        let Some(copy) = self.editor.clone() else {
            return Ok(false);
        };

        let id = self.add_or_replace(copy, false)?;
        if finish_editing {
            self.end_edit();
        } else if let (Some(copy), Some(committed)) =
            (self.editor.as_mut(), self.profiles.get(&id))
        {
            copy.creation_date = committed.creation_date;
            copy.modified_date = committed.modified_date;
        }
        Ok(true)
    }

    /// Close the editing session, whatever state it is in.
    /// Uncommitted changes are returned to the caller and otherwise lost.
    pub fn end_edit(&mut self) -> Option<CharacterProfile> {
        let closed = self.editor.take();
        if let Some(copy) = &closed {
            log::debug!("Editing session closed for {}", copy);
        }
        closed
    }

    /// Undo the uncommitted bone changes of the working copy.
    ///
    /// Bones known to the canonical profile get its values back in place,
    /// so their slots stay valid. Bones added during the session are
    /// removed. Returns `false` if no session is open or the canonical
    /// profile is gone.
    pub fn revert(&mut self) -> bool {
        let Some(copy) = self.editor.as_mut() else {
            return false;
        };
        let Some(original) = self.profiles.get(&copy.unique_id) else {
            log::debug!("Cannot revert {}: canonical profile is gone", copy);
            return false;
        };

        let names: Vec<String> =
            copy.bones.names().map(str::to_owned).collect();
        for name in names {
            match original.bones.get(&name) {
                Some(transform) => {
                    if let Some(target) = copy.bones.get_mut(&name) {
                        target.update_to_match(transform);
                    }
                }
                None => {
                    copy.bones.remove(&name);
                }
            }
        }

        log::debug!("Working copy of {} reverted", copy);
        true
    }

    /// Install an override for a character, replacing any previous one.
    pub fn set_temporary(
        &mut self,
        char_name: impl Into<String>,
        profile: CharacterProfile,
    ) -> Option<CharacterProfile> {
        self.temporary.insert(char_name.into(), profile)
    }

    pub fn clear_temporary(&mut self, char_name: &str) -> Option<CharacterProfile> {
        self.temporary.remove(char_name)
    }

    pub fn temporary(&self, char_name: &str) -> Option<&CharacterProfile> {
        self.temporary.get(char_name)
    }

    /// Snapshot of every profile active right now.
    ///
    /// In order: enabled canonical profiles except the one being edited,
    /// every temporary override, then the working copy if it is enabled.
    /// Several entries may target the same character.
    pub fn enabled_profiles(&self) -> Vec<CharacterProfile> {
        let editing = self.editor.as_ref().map(|copy| copy.unique_id);

        let mut active: Vec<CharacterProfile> = self
            .profiles
            .values()
            .filter(|p| p.enabled && Some(p.unique_id) != editing)
            .cloned()
            .collect();
        active.extend(self.temporary.values().cloned());
        if let Some(copy) = self.editor.as_ref().filter(|copy| copy.enabled) {
            active.push(copy.clone());
        }
        active
    }

    /// Move every converted profile into the registry as a new profile.
    ///
    /// The holding area is emptied even if some profiles fail to persist;
    /// those are logged and dropped. Returns the number of added profiles.
    pub fn process_pending_conversions(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let pending: Vec<CharacterProfile> = self.pending.drain().collect();
        let total = pending.len();
        let mut added = 0;
        for profile in pending {
            let label = profile.to_string();
            match self.add_or_replace(profile, true) {
                Ok(id) => {
                    log::debug!("Converted profile {} stored as {}", label, id);
                    added += 1;
                }
                Err(err) => {
                    log::warn!("Failed to store converted profile {}: {}", label, err)
                }
            }
        }

        log::info!("{} of {} converted profiles added", added, total);
        added
    }
}
