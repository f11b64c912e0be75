use crate::media::MediaKind;
use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Temp files are removed on drop unless persisted.
#[derive(Debug)]
pub struct PreparedMedia {
    path: PathBuf,
    kind: MediaKind,
    temporary: bool,
}

impl PreparedMedia {
    pub fn original(path: &Path, kind: MediaKind) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            temporary: false,
        }
    }

    pub fn temporary(path: PathBuf, kind: MediaKind) -> Self {
        Self {
            path,
            kind,
            temporary: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn persist(mut self, dest: &Path) -> Result<PathBuf> {
        ensure_parent_dir(dest)?;
        if abs_path(dest) == abs_path(&self.path) {
            self.temporary = false;
            return Ok(dest.to_path_buf());
        }
        if self.temporary {
            if fs::rename(&self.path, dest).is_err() {
                fs::copy(&self.path, dest).with_context(|| {
                    format!("failed to copy {} -> {}", self.path.display(), dest.display())
                })?;
                // drop removes the temp copy
                return Ok(dest.to_path_buf());
            }
            self.temporary = false;
        } else {
            fs::copy(&self.path, dest).with_context(|| {
                format!("failed to copy {} -> {}", self.path.display(), dest.display())
            })?;
        }
        Ok(dest.to_path_buf())
    }
}

impl Drop for PreparedMedia {
    fn drop(&mut self) {
        if !self.temporary {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("removed temp media {}", self.path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to remove temp media {}: {err}", self.path.display()),
        }
    }
}

pub fn out_root() -> PathBuf {
    env::var("STORY_OVERLAY_OUT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            env::var("STORY_OVERLAY_TMP_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| env::temp_dir().join("story-overlay"))
}

pub fn run_id() -> String {
    format!(
        "{}-{}-{}",
        timestamp_compact(),
        std::process::id(),
        rand::thread_rng().gen_range(1000..9999)
    )
}

pub fn scratch_path(dir: &Path, prefix: &str, suffix: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    Ok(dir.join(format!("{prefix}-{}.{suffix}", run_id())))
}

pub fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

pub fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

pub fn timestamp_compact() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

pub fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use serde_json::json;
    use tempfile::tempdir;

    const PNG: MediaKind = MediaKind::Image(ImageFormat::Png);

    #[test]
    fn temporary_media_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tmp.png");
        fs::write(&path, b"x").unwrap();
        let media = PreparedMedia::temporary(path.clone(), PNG);
        assert!(media.is_temporary());
        drop(media);
        assert!(!path.exists());
    }

    #[test]
    fn original_media_is_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("story.png");
        fs::write(&path, b"x").unwrap();
        drop(PreparedMedia::original(&path, PNG));
        assert!(path.exists());
    }

    #[test]
    fn persist_moves_temp_file() {
        let dir = tempdir().unwrap();
        let tmp = dir.path().join("tmp.png");
        fs::write(&tmp, b"payload").unwrap();
        let dest = dir.path().join("out").join("final.png");
        let saved = PreparedMedia::temporary(tmp.clone(), PNG).persist(&dest).unwrap();
        assert_eq!(saved, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        assert!(!tmp.exists());
    }

    #[test]
    fn persist_copies_original() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("story.png");
        fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("copy.png");
        PreparedMedia::original(&src, PNG).persist(&dest).unwrap();
        assert!(src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn scratch_paths_are_distinct_and_suffixed() {
        let dir = tempdir().unwrap();
        let a = scratch_path(&dir.path().join("nested"), "composite", "jpg").unwrap();
        assert!(a.parent().unwrap().is_dir());
        assert_eq!(a.extension().and_then(|s| s.to_str()), Some("jpg"));
        assert!(a
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap()
            .starts_with("composite-"));
    }

    #[test]
    fn writes_json_pretty() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.json");
        write_json_pretty(&target, &json!({"ok": true})).unwrap();
        assert!(target.exists());
    }
}
