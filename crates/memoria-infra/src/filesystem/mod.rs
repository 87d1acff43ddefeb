//! Data directory layout.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "MEMORIA_DATA_DIR";

/// Resolve the data directory.
///
/// Priority:
/// 1. `MEMORIA_DATA_DIR` environment variable
/// 2. `~/.memoria`
/// 3. `.memoria` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".memoria");
    }

    PathBuf::from(".memoria")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-memoria");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-memoria"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }

    #[tokio::test]
    async fn ensure_data_dir_creates_nested_path() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("memoria");

        ensure_data_dir(&nested).await.unwrap();
        ensure_data_dir(&nested).await.unwrap();

        assert!(nested.is_dir());
    }
}
