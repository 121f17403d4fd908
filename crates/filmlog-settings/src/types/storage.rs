use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk locations. Relative paths resolve against the data directory
/// (`~/.filmlog` unless `FILMLOG_HOME` is set).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub database: String,
    pub objects_dir: String,
    /// Base of the public URLs handed out for stored images.
    pub public_base_url: String,
    /// Durable local store shared by every process of this user.
    pub local_storage_file: String,
    /// Session file of the local auth provider.
    pub provider_session_file: String,
    pub operator_log: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: "database/filmlog.db".to_string(),
            objects_dir: "objects".to_string(),
            public_base_url: "http://localhost:3000/storage".to_string(),
            local_storage_file: "local-storage.json".to_string(),
            provider_session_file: "auth-session.json".to_string(),
            operator_log: "database/operator-log.db".to_string(),
        }
    }
}

impl StorageSettings {
    /// Resolve a configured path against `data_dir` unless it is absolute.
    pub fn resolve(data_dir: &Path, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_data_dir() {
        let resolved = StorageSettings::resolve(Path::new("/data"), "database/filmlog.db");
        assert_eq!(resolved, PathBuf::from("/data/database/filmlog.db"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let resolved = StorageSettings::resolve(Path::new("/data"), "/var/lib/filmlog.db");
        assert_eq!(resolved, PathBuf::from("/var/lib/filmlog.db"));
    }
}
