//! First-run environment bootstrap.
//!
//! Ensures a project env file exists (seeding it with the session's initial
//! key/value pair) and loads it into this process so the supervised server
//! inherits it.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::{DevError, Result};

/// Env files in lookup order
pub const ENV_FILES: [&str; 2] = [".env.development", ".env"];

/// First existing env file in `dir`
pub fn find_env_file(dir: &Path) -> Option<PathBuf> {
    ENV_FILES.iter().map(|name| dir.join(name)).find(|path| path.is_file())
}

/// Return the project's env file, creating `.env` from `initial` when none exists.
pub fn ensure_env_file(dir: &Path, initial: Option<(&str, &str)>) -> Result<Option<PathBuf>> {
    if let Some(existing) = find_env_file(dir) {
        return Ok(Some(existing));
    }

    let Some((key, value)) = initial else {
        return Ok(None);
    };

    if key.is_empty() || key.contains('=') {
        return Err(DevError::Config(format!("invalid env key '{}'", key)));
    }

    let path = dir.join(".env");
    std::fs::write(&path, format!("{}={}\n", key, value))?;
    info!("Created {} with {}", path.display(), key);
    Ok(Some(path))
}

/// Load `path` into the process environment; existing variables win
pub fn load_env(path: &Path) -> Result<()> {
    dotenvy::from_path(path).map_err(|e| DevError::Config(format!("failed to load {}: {}", path.display(), e)))?;
    info!("Loaded environment from {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prefers_development_env() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".env"), "A=1\n").unwrap();
        std::fs::write(temp.path().join(".env.development"), "A=2\n").unwrap();

        assert_eq!(find_env_file(temp.path()), Some(temp.path().join(".env.development")));
    }

    #[test]
    fn test_existing_file_untouched() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".env"), "EXISTING=1\n").unwrap();

        let path = ensure_env_file(temp.path(), Some(("OPENAI_API_KEY", "sk-test"))).unwrap();
        assert_eq!(path, Some(temp.path().join(".env")));
        assert_eq!(std::fs::read_to_string(temp.path().join(".env")).unwrap(), "EXISTING=1\n");
    }

    #[test]
    fn test_creates_env_from_initial_pair() {
        let temp = TempDir::new().unwrap();

        let path = ensure_env_file(temp.path(), Some(("OPENAI_API_KEY", "sk-test"))).unwrap();
        assert_eq!(path, Some(temp.path().join(".env")));
        assert_eq!(
            std::fs::read_to_string(temp.path().join(".env")).unwrap(),
            "OPENAI_API_KEY=sk-test\n"
        );
    }

    #[test]
    fn test_no_file_without_initial_pair() {
        let temp = TempDir::new().unwrap();
        assert_eq!(ensure_env_file(temp.path(), None).unwrap(), None);
        assert!(!temp.path().join(".env").exists());
    }

    #[test]
    fn test_rejects_invalid_key() {
        let temp = TempDir::new().unwrap();
        let err = ensure_env_file(temp.path(), Some(("A=B", "c"))).unwrap_err();
        assert!(matches!(err, DevError::Config(_)));
    }

    #[test]
    fn test_load_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        std::fs::write(&path, "DEVLOOP_BOOTSTRAP_TEST_VAR=loaded\n").unwrap();

        load_env(&path).unwrap();
        assert_eq!(std::env::var("DEVLOOP_BOOTSTRAP_TEST_VAR").unwrap(), "loaded");
    }
}
