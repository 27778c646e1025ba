use std::collections::VecDeque;

use crate::profile::CharacterProfile;

/// Holding area for profiles produced by a legacy-format migration.
///
/// The migration step fills it before a registry exists; the registry
/// takes ownership of it and drains it once through its add path.
#[derive(Debug, Default)]
pub struct PendingConversions {
    queue: VecDeque<CharacterProfile>,
}

impl PendingConversions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, profile: CharacterProfile) {
        self.queue.push_back(profile);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every pending profile out, in the order they were pushed
    pub fn drain(&mut self) -> impl Iterator<Item = CharacterProfile> + '_ {
        self.queue.drain(..)
    }
}

impl FromIterator<CharacterProfile> for PendingConversions {
    fn from_iter<I: IntoIterator<Item = CharacterProfile>>(iter: I) -> Self {
        Self {
            queue: iter.into_iter().collect(),
        }
    }
}
