use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transform::BoneTransform;

/// Stable handle to a bone transform inside a [`Bones`] arena.
///
/// A handle stays valid for as long as the bone is not removed, including
/// across in-place updates such as a revert of an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneSlot(usize);

/// Bone name to transform mapping backed by an arena of slots.
///
/// Slots of removed bones are never reused, so a stale [`BoneSlot`]
/// resolves to nothing instead of to some other bone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, BoneTransform>",
    into = "BTreeMap<String, BoneTransform>"
)]
pub struct Bones {
    slots: Vec<Option<BoneTransform>>,
    index: BTreeMap<String, BoneSlot>,
}

impl Bones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Insert or overwrite a bone.
    ///
    /// An existing bone keeps its slot and is updated in place.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        transform: BoneTransform,
    ) -> BoneSlot {
        let name = name.into();
        if let Some(slot) = self.index.get(&name).copied() {
            if let Some(existing) = self.by_slot_mut(slot) {
                existing.update_to_match(&transform);
            }
            return slot;
        }

        let slot = BoneSlot(self.slots.len());
        self.slots.push(Some(transform));
        self.index.insert(name, slot);
        slot
    }

    pub fn remove(&mut self, name: &str) -> Option<BoneTransform> {
        let slot = self.index.remove(name)?;
        self.slots.get_mut(slot.0).and_then(Option::take)
    }

    pub fn slot_of(&self, name: &str) -> Option<BoneSlot> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&BoneTransform> {
        self.slot_of(name)
            .and_then(|slot| self.by_slot(slot))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BoneTransform> {
        let slot = self.slot_of(name)?;
        self.by_slot_mut(slot)
    }

    pub fn by_slot(&self, slot: BoneSlot) -> Option<&BoneTransform> {
        self.slots.get(slot.0)?.as_ref()
    }

    pub fn by_slot_mut(&mut self, slot: BoneSlot) -> Option<&mut BoneTransform> {
        self.slots.get_mut(slot.0)?.as_mut()
    }

    /// Bone names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoneTransform)> {
        self.index.iter().filter_map(|(name, slot)| {
            self.slots
                .get(slot.0)
                .and_then(Option::as_ref)
                .map(|transform| (name.as_str(), transform))
        })
    }

    /// Keep only the bones for which `keep` returns true.
    /// Returns the number of removed bones.
    pub fn retain(
        &mut self,
        mut keep: impl FnMut(&str, &BoneTransform) -> bool,
    ) -> usize {
        let doomed: Vec<String> = self
            .iter()
            .filter(|(name, transform)| !keep(*name, *transform))
            .map(|(name, _)| name.to_owned())
            .collect();

        for name in &doomed {
            self.remove(name);
        }
        doomed.len()
    }
}

impl PartialEq for Bones {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl From<BTreeMap<String, BoneTransform>> for Bones {
    fn from(map: BTreeMap<String, BoneTransform>) -> Self {
        let mut bones = Bones::new();
        for (name, transform) in map {
            bones.insert(name, transform);
        }
        bones
    }
}

impl From<Bones> for BTreeMap<String, BoneTransform> {
    fn from(bones: Bones) -> Self {
        bones
            .iter()
            .map(|(name, transform)| (name.to_owned(), *transform))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<(S, BoneTransform)> for Bones {
    fn from_iter<I: IntoIterator<Item = (S, BoneTransform)>>(iter: I) -> Self {
        let mut bones = Bones::new();
        for (name, transform) in iter {
            bones.insert(name, transform);
        }
        bones
    }
}
