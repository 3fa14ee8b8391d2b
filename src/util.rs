use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ApiError;

/// Directory holding config and persisted filters (`~/.tcis`).
pub fn tcis_home() -> Result<PathBuf, ApiError> {
    let home = dirs::home_dir()
        .ok_or_else(|| ApiError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".tcis"))
}

/// Write `contents` to `path` through a sibling temp file and a rename, so a
/// reader never sees a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ApiError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| ApiError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);
    fs::write(&temp_path, contents)
        .map_err(|e| ApiError::Io(format!("Failed to write {}: {}", temp_path.display(), e)))?;
    fs::rename(&temp_path, path)
        .map_err(|e| ApiError::Io(format!("Failed to replace {}: {}", path.display(), e)))
}

/// Reduce a user-supplied export name to a safe file stem.
///
/// Example: "Hot Leads / Q3" → "hot_leads_q3"
pub fn file_stem(name: &str) -> String {
    let stem = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if stem.is_empty() {
        "export".to_string()
    } else {
        stem
    }
}

/// Truncate to `max` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_basic() {
        assert_eq!(file_stem("tcis_leads"), "tcis_leads");
    }

    #[test]
    fn test_file_stem_special_chars() {
        assert_eq!(file_stem("Hot Leads / Q3"), "hot_leads_q3");
    }

    #[test]
    fn test_file_stem_empty_falls_back() {
        assert_eq!(file_stem("///"), "export");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert!(!dir.path().join("nested").join("out.txt.tmp").exists());
    }
}
