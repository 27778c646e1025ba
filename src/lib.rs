pub mod bones;
pub mod conversion;
pub mod errors;
pub mod profile;
pub mod registry;
pub mod storage;
pub mod transform;

pub use bones::{BoneSlot, Bones};
pub use conversion::PendingConversions;
pub use errors::{ProfileError, Result};
pub use profile::{CharacterProfile, ProfileId};
pub use registry::ProfileRegistry;
pub use storage::{FolderStorage, MemoryStorage, ProfileStorage};
pub use transform::BoneTransform;

// Default folder for profile files, relative to a configuration root
pub const PROFILES_FOLDER: &str = ".profiles";
pub const PROFILE_EXTENSION: &str = "json";

// Version of the on-disk profile envelope
pub const STORAGE_VERSION: i32 = 1;
