//! Flat file persistence: JSON artifacts, text artifacts and atomic
//! overwrites with timestamped backups.

use crate::Result;
use crate::error::ChunkwiseError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Suffix of the temporary file written before an overwrite
const SWAP_SUFFIX: &str = "swp";

/// Timestamp format used in backup file names
const BACKUP_TIMESTAMP: &str = "%Y%m%d-%H%M%S";

/// Create the parent directory of `path` if it does not exist yet
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                ChunkwiseError::file_system(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            debug!("Created directory {}", dir.display());
        }
    }
    Ok(())
}

/// Save a value as pretty-printed JSON
pub fn save_json_file<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json)?;
    info!("Saved {}", path.display());
    Ok(())
}

/// Save a string as a text file
pub fn save_text_file(path: &Path, content: &str) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, content)?;
    info!("Saved {}", path.display());
    Ok(())
}

/// Read the non-empty, trimmed lines of a text file
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let data = fs::read_to_string(path)?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Path the previous version of `path` is moved to during an overwrite
pub fn backup_path(path: &Path, timestamp: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".old.{}", timestamp));
    PathBuf::from(name)
}

/// Replace `path` with `lines` (one per line) without ever leaving a
/// half-written file in place.
///
/// The content goes to `<path>.swp` first, the current file (if any) is
/// renamed to `<path>.old.<timestamp>`, then the swap file is renamed into
/// place. Returns the backup path when a previous version existed.
pub fn overwrite_lines(path: &Path, lines: &[String]) -> Result<Option<PathBuf>> {
    ensure_parent_dir(path)?;

    let mut swap = path.as_os_str().to_os_string();
    swap.push(format!(".{}", SWAP_SUFFIX));
    let swap = PathBuf::from(swap);

    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    fs::write(&swap, content)?;

    let backup = if path.exists() {
        let timestamp = chrono::Local::now().format(BACKUP_TIMESTAMP).to_string();
        let backup = unique_backup_path(path, &timestamp);
        fs::rename(path, &backup)?;
        Some(backup)
    } else {
        None
    };

    fs::rename(&swap, path)?;
    info!("Overwrote {} ({} lines)", path.display(), lines.len());
    Ok(backup)
}

/// Backup path that does not clobber an earlier backup from the same second
fn unique_backup_path(path: &Path, timestamp: &str) -> PathBuf {
    let candidate = backup_path(path, timestamp);
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| backup_path(path, &format!("{}-{}", timestamp, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lines_skips_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        fs::write(&path, "k0\n\n  k1  \n\nk2").unwrap();
        assert_eq!(read_lines(&path).unwrap(), vec!["k0", "k1", "k2"]);
    }

    #[test]
    fn test_overwrite_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apikey.txt");
        fs::write(&path, "k0\nk1\nk2\n").unwrap();

        let backup = overwrite_lines(&path, &["k1".to_string(), "k2".to_string()])
            .unwrap()
            .expect("backup created");

        assert_eq!(fs::read_to_string(&path).unwrap(), "k1\nk2\n");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "k0\nk1\nk2\n");
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("apikey.txt.old."));
        assert!(!dir.path().join("apikey.txt.swp").exists());
    }

    #[test]
    fn test_overwrite_twice_same_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apikey.txt");
        fs::write(&path, "a\n").unwrap();

        let first = overwrite_lines(&path, &["b".to_string()]).unwrap().unwrap();
        let second = overwrite_lines(&path, &["c".to_string()]).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "b\n");
    }

    #[test]
    fn test_overwrite_without_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("apikey.txt");
        let backup = overwrite_lines(&path, &["k".to_string()]).unwrap();
        assert!(backup.is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), "k\n");
    }

    #[test]
    fn test_save_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("chunks.json");
        save_json_file(&path, &vec!["a", "b"]).unwrap();
        let loaded: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, vec!["a", "b"]);
    }
}
