//! Profile persistence. Profiles are keyed by name; the JSON store keeps one
//! file per profile in a directory.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::profile::{builtin_profiles, Profile};

pub trait ProfileStore: Send + Sync {
    /// Names of all stored profiles, sorted.
    fn list(&self) -> Result<Vec<String>, StoreError>;
    fn load(&self, name: &str) -> Result<Profile, StoreError>;
    fn save(&self, profile: &Profile) -> Result<(), StoreError>;
    fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Saves the built-in profiles if the store is empty. Returns how many
/// were written.
pub fn seed_builtin_profiles(store: &dyn ProfileStore) -> Result<usize, StoreError> {
    if !store.list()?.is_empty() {
        return Ok(0);
    }
    let profiles = builtin_profiles();
    for profile in &profiles {
        store.save(profile)?;
    }
    info!("Seeded {} built-in profiles", profiles.len());
    Ok(profiles.len())
}

// "Lead-free Reflow" -> "lead-free_reflow"
fn file_stem(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub struct JsonProfileStore {
    dir: PathBuf,
}

impl JsonProfileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(JsonProfileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(name)))
    }

    fn read_file(path: &Path) -> Result<Profile, StoreError> {
        let text = fs::read_to_string(path)?;
        let profile = Profile::from_json(&text).map_err(|e| StoreError::Parse(e.to_string()))?;
        profile
            .validate()
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(profile)
    }
}

impl ProfileStore for JsonProfileStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_file(&path) {
                Ok(profile) => names.push(profile.name),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn load(&self, name: &str) -> Result<Profile, StoreError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let profile = Self::read_file(&path)?;
        // Two names may share a file stem; only the exact one counts.
        if profile.name != name {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(profile)
    }

    fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        profile.validate().map_err(StoreError::Invalid)?;
        let text = profile
            .to_json()
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        let current = self.path_for(&profile.name);
        // A readable file under the same stem may belong to another name.
        if let Ok(existing) = Self::read_file(&current) {
            if existing.name != profile.name {
                return Err(StoreError::NameCollision {
                    name: profile.name.clone(),
                    existing: existing.name,
                });
            }
        }
        let tmp = current.with_extension("json.new");
        let mut file = File::create(&tmp)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &current)?;
        info!("Saved profile '{}' to {}", profile.name, current.display());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        // Goes through load so a stem collision cannot delete another profile.
        self.load(name)?;
        fs::remove_file(self.path_for(name))?;
        info!("Deleted profile '{}'", name);
        Ok(())
    }
}

/// Volatile store, ordered by name.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<BTreeMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.profiles.lock() {
            for p in profiles {
                map.insert(p.name.clone(), p);
            }
        }
        store
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Profile>>, StoreError> {
        self.profiles
            .lock()
            .map_err(|_| StoreError::Io("profile map poisoned".to_string()))
    }
}

impl ProfileStore for MemoryProfileStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.map()?.keys().cloned().collect())
    }

    fn load(&self, name: &str) -> Result<Profile, StoreError> {
        self.map()?
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        profile.validate().map_err(StoreError::Invalid)?;
        self.map()?.insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.map()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
