use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::errors::{ProfileError, Result};
use crate::profile::{CharacterProfile, ProfileId};
use crate::storage::ProfileStorage;
use crate::{PROFILES_FOLDER, PROFILE_EXTENSION, STORAGE_VERSION};

const TEMP_NAME_LENGTH: usize = 10;

/// Envelope written to disk around every profile
#[derive(Serialize, Deserialize)]
struct ProfileFileData {
    version: i32,
    profile: CharacterProfile,
}

/// Stores each profile as `<unique_id>.json` inside one folder.
pub struct FolderStorage {
    label: String,
    path: PathBuf,
    last_assigned: ProfileId,
}

impl FolderStorage {
    /// Create a new folder storage with a diagnostic label and folder path
    pub fn new(label: String, path: &Path) -> Self {
        Self {
            label,
            path: PathBuf::from(path),
            last_assigned: ProfileId::NEW,
        }
    }

    /// Folder storage at `<root>/PROFILES_FOLDER`
    pub fn in_root(label: String, root: &Path) -> Self {
        Self::new(label, &root.join(PROFILES_FOLDER))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the file holding the profile with the given identity
    pub fn profile_path(&self, id: ProfileId) -> PathBuf {
        self.path
            .join(format!("{}.{}", id, PROFILE_EXTENSION))
    }

    fn storage_error(&self, message: impl Into<String>) -> ProfileError {
        ProfileError::Storage(self.label.clone(), message.into())
    }

    /// Only canonical names count, so that a record can always be found
    /// again under `profile_path` of its id
    fn extract_id_from_file_path(&self, path: &Path) -> Result<ProfileId> {
        let stem = path
            .file_stem()
            .ok_or_else(|| {
                self.storage_error("Failed to extract file stem from filename")
            })?
            .to_str()
            .ok_or_else(|| {
                self.storage_error("Failed to convert file stem to string")
            })?;
        let id = stem
            .parse::<ProfileId>()
            .map_err(|_| self.storage_error("Failed to parse id from filename"))?;
        if id.is_new() || id.to_string() != stem {
            return Err(self.storage_error(format!(
                "Non-canonical profile file name {}",
                stem
            )));
        }
        Ok(id)
    }

    /// Pick the identity for a profile that has none yet
    fn assign_id(&mut self) -> Result<ProfileId> {
        let mut highest = self.last_assigned;
        for location in self.enumerate()? {
            if let Ok(id) = self.extract_id_from_file_path(&location) {
                highest = highest.max(id);
            }
        }
        self.last_assigned = highest
            .next()
            .ok_or_else(|| self.storage_error("identity space exhausted"))?;
        Ok(self.last_assigned)
    }

    /// Write `data` next to `dest` first, then move it into place
    fn write_atomically(&self, dest: &Path, data: &[u8]) -> Result<()> {
        let temp_name: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(TEMP_NAME_LENGTH)
            .collect();
        let temp_path = self.path.join(format!(".{}.tmp", temp_name));

        let written = File::create(&temp_path)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                writer.write_all(data)?;
                writer.flush()?;
                writer.get_ref().sync_all()
            })
            .and_then(|_| fs::rename(&temp_path, dest));

        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

impl ProfileStorage for FolderStorage {
    type Location = PathBuf;

    fn enumerate(&self) -> Result<Vec<PathBuf>> {
        if !self.path.exists() {
            log::debug!("{}: folder {:?} does not exist yet", self.label, self.path);
            return Ok(vec![]);
        }
        if !self.path.is_dir() {
            return Err(self.storage_error("Path is not a directory"));
        }

        let mut locations = vec![];
        let entries = WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
        for entry in entries {
            let entry = entry.map_err(|err| self.storage_error(err.to_string()))?;
            if is_profile_file(&entry) {
                locations.push(entry.into_path());
            }
        }

        Ok(locations.into_iter().sorted().collect())
    }

    fn load(&self, location: &PathBuf) -> Result<CharacterProfile> {
        let id = self.extract_id_from_file_path(location)?;
        let file = File::open(location)?;
        let data: ProfileFileData = serde_json::from_reader(file)
            .map_err(|err| self.storage_error(err.to_string()))?;

        if data.version != STORAGE_VERSION {
            return Err(self.storage_error(format!(
                "Storage version mismatch: expected {}, got {}",
                STORAGE_VERSION, data.version
            )));
        }

        // The file name is the authoritative identity
        let mut profile = data.profile;
        profile.unique_id = id;
        log::trace!("{}: loaded {} from {:?}", self.label, profile, location);
        Ok(profile)
    }

    fn save(&mut self, profile: &mut CharacterProfile) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        if profile.unique_id.is_new() {
            profile.unique_id = self.assign_id()?;
        }

        let data = ProfileFileData {
            version: STORAGE_VERSION,
            profile: profile.clone(),
        };
        let json = serde_json::to_string_pretty(&data)?;
        self.write_atomically(&self.profile_path(profile.unique_id), json.as_bytes())?;

        log::info!(
            "{}: profile {} has been written with {} bones",
            self.label,
            profile,
            profile.bones.len()
        );
        Ok(())
    }

    fn delete(&mut self, profile: &CharacterProfile) -> Result<()> {
        if profile.unique_id.is_new() {
            return Ok(());
        }

        let path = self.profile_path(profile.unique_id);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|err| self.storage_error(err.to_string()))?;
            log::info!("{}: profile {} has been erased", self.label, profile);
        }
        Ok(())
    }
}

fn is_profile_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .path()
            .extension()
            .map_or(false, |ext| ext == PROFILE_EXTENSION)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::BoneTransform;
    use glam::Vec3;
    use tempdir::TempDir;

    fn profile_with_bone(char_name: &str) -> CharacterProfile {
        let mut profile = CharacterProfile::new(char_name);
        profile.bones.insert(
            "head",
            BoneTransform::new(Vec3::ZERO, Vec3::ZERO, Vec3::splat(1.5)),
        );
        profile
    }

    #[test]
    fn test_folder_storage_save_load() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let mut storage =
            FolderStorage::new("test".to_owned(), temp_dir.path());

        let mut profile = profile_with_bone("Alice");
        storage.save(&mut profile).unwrap();
        assert_eq!(profile.unique_id, ProfileId(1));
        assert!(storage.profile_path(ProfileId(1)).exists());

        let locations = storage.enumerate().unwrap();
        assert_eq!(locations.len(), 1);
        let loaded = storage.load(&locations[0]).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_folder_storage_assigns_fresh_ids() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let mut storage =
            FolderStorage::in_root("test".to_owned(), temp_dir.path());

        let mut existing = profile_with_bone("Alice");
        existing.unique_id = ProfileId(41);
        storage.save(&mut existing).unwrap();
        assert_eq!(existing.unique_id, ProfileId(41));

        let mut first = profile_with_bone("Bob");
        storage.save(&mut first).unwrap();
        let mut second = profile_with_bone("Carol");
        storage.save(&mut second).unwrap();

        assert_eq!(first.unique_id, ProfileId(42));
        assert_eq!(second.unique_id, ProfileId(43));
        assert!(temp_dir.path().join(PROFILES_FOLDER).is_dir());
    }

    #[test]
    fn test_folder_storage_file_name_wins() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let mut storage =
            FolderStorage::new("test".to_owned(), temp_dir.path());

        let mut profile = profile_with_bone("Alice");
        storage.save(&mut profile).unwrap();
        let renamed = temp_dir.path().join("9.json");
        fs::rename(storage.profile_path(profile.unique_id), &renamed).unwrap();

        let loaded = storage.load(&renamed).unwrap();
        assert_eq!(loaded.unique_id, ProfileId(9));
    }

    #[test]
    fn test_folder_storage_rejects_malformed_records() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let storage = FolderStorage::new("test".to_owned(), temp_dir.path());

        let garbage = temp_dir.path().join("3.json");
        fs::write(&garbage, b"{ not json").unwrap();
        assert!(storage.load(&garbage).is_err());

        let wrong_version = temp_dir.path().join("4.json");
        let mut profile = profile_with_bone("Alice");
        profile.unique_id = ProfileId(4);
        let data = serde_json::json!({ "version": 99, "profile": profile });
        fs::write(&wrong_version, data.to_string()).unwrap();
        assert!(matches!(
            storage.load(&wrong_version),
            Err(ProfileError::Storage(_, _))
        ));

        let bad_name = temp_dir.path().join("alice.json");
        fs::write(&bad_name, b"{}").unwrap();
        assert!(storage.load(&bad_name).is_err());
    }

    #[test]
    fn test_folder_storage_rejects_non_canonical_names() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let mut storage =
            FolderStorage::new("test".to_owned(), temp_dir.path());

        let mut profile = profile_with_bone("Alice");
        profile.unique_id = ProfileId(7);
        storage.save(&mut profile).unwrap();
        let canonical = storage.profile_path(ProfileId(7));

        for name in ["007.json", "+7.json", "0.json"] {
            let renamed = temp_dir.path().join(name);
            fs::copy(&canonical, &renamed).unwrap();
            assert!(matches!(
                storage.load(&renamed),
                Err(ProfileError::Storage(_, _))
            ));
        }
        assert_eq!(storage.load(&canonical).unwrap().unique_id, ProfileId(7));
    }

    #[test]
    fn test_folder_storage_identity_space_exhausted() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let mut storage =
            FolderStorage::new("test".to_owned(), temp_dir.path());

        let mut last = profile_with_bone("Alice");
        last.unique_id = ProfileId(u32::MAX);
        storage.save(&mut last).unwrap();

        let mut fresh = profile_with_bone("Bob");
        assert!(matches!(
            storage.save(&mut fresh),
            Err(ProfileError::Storage(_, _))
        ));
        assert!(fresh.unique_id.is_new());
        assert_eq!(storage.enumerate().unwrap().len(), 1);
    }

    #[test]
    fn test_folder_storage_enumerate_skips_foreign_files() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let mut storage =
            FolderStorage::new("test".to_owned(), temp_dir.path());

        let mut profile = profile_with_bone("Alice");
        storage.save(&mut profile).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(temp_dir.path().join(".5.json"), b"{}").unwrap();
        fs::create_dir(temp_dir.path().join("6.json")).unwrap();

        let locations = storage.enumerate().unwrap();
        assert_eq!(locations, vec![storage.profile_path(profile.unique_id)]);
    }

    #[test]
    fn test_folder_storage_missing_folder_is_empty() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let storage = FolderStorage::new(
            "test".to_owned(),
            &temp_dir.path().join("nowhere"),
        );
        assert!(storage.enumerate().unwrap().is_empty());
    }

    #[test]
    fn test_folder_storage_delete() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let mut storage =
            FolderStorage::new("test".to_owned(), temp_dir.path());

        let mut profile = profile_with_bone("Alice");
        storage.save(&mut profile).unwrap();
        storage.delete(&profile).unwrap();
        assert!(!storage.profile_path(profile.unique_id).exists());

        // Absent records are fine
        storage.delete(&profile).unwrap();
        storage
            .delete(&CharacterProfile::new("Nobody"))
            .unwrap();
    }
}
