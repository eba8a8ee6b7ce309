//! Persisted access key, written by `login` and removed by `logout`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const KEY_FILE: &str = "access-key";

pub fn default_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no user config directory")?;
    Ok(base.join("prospect-manager").join(KEY_FILE))
}

pub fn load(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s.trim().to_string()).filter(|k| !k.is_empty())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

pub fn save(path: &Path, key: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, key.trim()).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(())
}

/// Remove the stored key. Returns whether a key was present.
pub fn clear(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Explicit key (flag or environment) wins over the stored one.
pub fn resolve(explicit: Option<&str>, path: &Path) -> Result<Option<String>> {
    if let Some(k) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(Some(k.to_string()));
    }
    load(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pm").join(KEY_FILE);
        assert_eq!(load(&path).unwrap(), None);

        save(&path, "  abc123\n").unwrap();
        assert_eq!(load(&path).unwrap().as_deref(), Some("abc123"));

        assert!(clear(&path).unwrap());
        assert!(!clear(&path).unwrap());
        assert_eq!(load(&path).unwrap(), None);
    }

    #[test]
    fn explicit_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(KEY_FILE);
        save(&path, "stored").unwrap();
        assert_eq!(
            resolve(Some("flag"), &path).unwrap().as_deref(),
            Some("flag")
        );
        assert_eq!(resolve(Some("  "), &path).unwrap().as_deref(), Some("stored"));
        assert_eq!(resolve(None, &path).unwrap().as_deref(), Some("stored"));
    }
}
