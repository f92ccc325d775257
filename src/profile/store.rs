use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::profile::LearningProfile;

/// Durable load/save of learner profiles.
///
/// `load` reports an absent profile as an error with `ErrorKind::NotFound`.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<LearningProfile, EngineError>;
    async fn save(&self, user_id: &str, profile: &LearningProfile) -> Result<(), EngineError>;
}

/// Platform data directory for engine files
pub fn default_data_dir() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join("Library/Application Support"))
    } else if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share"))
    };

    match base {
        Some(dir) => dir.join("adaptive-engine"),
        None => PathBuf::from("data"),
    }
}

/// Readable characters kept at the front of a file stem
const STEM_PREFIX_LEN: usize = 32;

/// File stem for a learner: a sanitized prefix for humans plus the sha256 of
/// the full id, so distinct ids never share a file and none escape the directory.
pub(crate) fn file_stem(user_id: &str) -> String {
    let prefix: String = user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(STEM_PREFIX_LEN)
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    format!("{}-{:x}", prefix, hasher.finalize())
}

/// One pretty-printed JSON file per learner under `<root>/profiles/`
pub struct JsonProfileStore {
    root: PathBuf,
}

impl JsonProfileStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        JsonProfileStore { root: root.into() }
    }

    pub fn in_default_dir() -> Self {
        Self::new(default_data_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile_path(&self, user_id: &str) -> PathBuf {
        self.root
            .join("profiles")
            .join(format!("{}.json", file_stem(user_id)))
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn load(&self, user_id: &str) -> Result<LearningProfile, EngineError> {
        let path = self.profile_path(user_id);
        let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
            let err = EngineError::from(e).with_context(format!("path: {:?}", path));
            if err.is_not_found() {
                EngineError::not_found(format!("No profile stored for '{}'", user_id), "profile_load")
                    .with_context(format!("path: {:?}", path))
            } else {
                err
            }
        })?;

        serde_json::from_str::<LearningProfile>(&data).map_err(|e| {
            EngineError::from(e).with_context(format!("path: {:?}", path))
        })
    }

    async fn save(&self, user_id: &str, profile: &LearningProfile) -> Result<(), EngineError> {
        let path = self.profile_path(user_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::from(e).with_context(format!("path: {:?}", parent)))?;
        }

        let json = serde_json::to_string_pretty(profile)?;

        // write-then-rename so a crash never leaves a half-written profile
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| EngineError::from(e).with_context(format!("path: {:?}", tmp)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::from(e).with_context(format!("path: {:?}", path)))?;

        tracing::debug!(user_id, path = ?path, "Profile saved");
        Ok(())
    }
}

/// Process-local store, for embedding and tests
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, LearningProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<LearningProfile> {
        self.profiles.read().get(user_id).cloned()
    }

    pub fn insert(&self, profile: LearningProfile) {
        self.profiles.write().insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, user_id: &str) -> Result<LearningProfile, EngineError> {
        self.get(user_id).ok_or_else(|| {
            EngineError::not_found(format!("No profile stored for '{}'", user_id), "profile_load")
        })
    }

    async fn save(&self, user_id: &str, profile: &LearningProfile) -> Result<(), EngineError> {
        self.profiles
            .write()
            .insert(user_id.to_string(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_strips_path_characters() {
        let stem = file_stem("../etc/passwd");
        assert!(stem.starts_with("etcpasswd-"));
        assert!(!stem.contains('/') && !stem.contains('.'));
        assert!(file_stem("user-42_a").starts_with("user-42_a-"));
    }

    #[test]
    fn test_file_stem_keeps_similar_ids_apart() {
        assert_ne!(file_stem("john.doe"), file_stem("john_doe"));
        assert_ne!(file_stem("john.doe"), file_stem("johndoe"));
        assert_ne!(file_stem("a/b"), file_stem("a_b"));
        assert_eq!(file_stem("john.doe"), file_stem("john.doe"));
    }

    #[test]
    fn test_file_stem_bounds_long_ids() {
        let long = "x".repeat(500);
        let stem = file_stem(&long);
        assert_eq!(stem.len(), STEM_PREFIX_LEN + 1 + 64);
        assert_ne!(stem, file_stem(&"x".repeat(501)));
    }
}
