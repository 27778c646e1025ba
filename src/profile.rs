use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::bones::Bones;
use crate::errors::ProfileError;

/// Durable identity of a profile.
///
/// [`ProfileId::NEW`] marks a profile which has not been persisted yet;
/// it never identifies a stored profile.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ProfileId(pub u32);

impl ProfileId {
    pub const NEW: ProfileId = ProfileId(0);

    pub fn is_new(&self) -> bool {
        *self == Self::NEW
    }

    /// The identity after this one, or `None` once the id space is used up
    pub fn next(&self) -> Option<ProfileId> {
        self.0.checked_add(1).map(ProfileId)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileId {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProfileId(s.parse()?))
    }
}

/// A persistable set of per-bone overrides for one character.
///
/// `Clone` is a deep copy: the copy owns its bones, and keeps the identity
/// and timestamps of the source until it is registered as a new profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub unique_id: ProfileId,
    pub char_name: String,
    #[serde(default)]
    pub profile_name: String,
    pub enabled: bool,
    pub creation_date: SystemTime,
    pub modified_date: SystemTime,
    #[serde(default)]
    pub bones: Bones,
}

impl CharacterProfile {
    pub fn new(char_name: impl Into<String>) -> Self {
        let char_name = char_name.into();
        let now = SystemTime::now();
        Self {
            unique_id: ProfileId::NEW,
            profile_name: char_name.clone(),
            char_name,
            enabled: false,
            creation_date: now,
            modified_date: now,
            bones: Bones::new(),
        }
    }

    pub fn with_profile_name(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_name = profile_name.into();
        self
    }

    /// Two profiles are the same iff they share a non-new identity
    pub fn is_same_profile(&self, other: &CharacterProfile) -> bool {
        !self.unique_id.is_new() && self.unique_id == other.unique_id
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Drop every bone whose transform is not edited.
    /// Returns the number of dropped bones.
    pub fn prune_idempotent_transforms(&mut self) -> usize {
        let removed = self
            .bones
            .retain(|_, transform| transform.is_edited());
        if removed > 0 {
            log::trace!(
                "pruned {} unedited bones from profile {} of {}",
                removed,
                self.unique_id,
                self.char_name
            );
        }
        removed
    }
}

impl fmt::Display for CharacterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, #{})",
            self.profile_name, self.char_name, self.unique_id
        )
    }
}
