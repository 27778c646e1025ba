pub mod folder_storage;
pub mod memory_storage;

use crate::errors::Result;
use crate::profile::CharacterProfile;

pub use folder_storage::FolderStorage;
pub use memory_storage::MemoryStorage;

/// Durable home of character profiles.
///
/// The registry drives it synchronously and never caches its locations.
pub trait ProfileStorage {
    /// Where a single profile record lives (a file path, a key, ...)
    type Location;

    /// List the locations of all stored profile records.
    fn enumerate(&self) -> Result<Vec<Self::Location>>;

    /// Parse the profile stored at `location`.
    ///
    /// A malformed record is an error for this record only.
    fn load(&self, location: &Self::Location) -> Result<CharacterProfile>;

    /// Create or overwrite the durable form of `profile`.
    ///
    /// A profile with a new identity is assigned one, written back into
    /// `profile.unique_id`.
    fn save(&mut self, profile: &mut CharacterProfile) -> Result<()>;

    /// Remove the durable form of `profile`, if any.
    fn delete(&mut self, profile: &CharacterProfile) -> Result<()>;
}
