//! Small filesystem helpers shared by the read and write paths.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::{Error, Result};

/// Timestamp format of the `last-updated` metadata key.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Local wall-clock time as `YYYY-MM-DD HH:mm`.
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Reads a file as UTF-8, replacing invalid sequences.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(err) => Ok(String::from_utf8_lossy(err.as_bytes()).into_owned()),
    }
}

/// `<name>.<suffix>` next to `path`.
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix.trim_start_matches('.'));
    path.with_file_name(name)
}

/// Replaces `path` with `text` so that readers see either the old or the new
/// content, never a partial file.
///
/// When the file already exists its current content is first copied to the
/// backup path (overwriting any older backup). Returns the backup path if one
/// was written.
pub fn atomic_write(path: &Path, text: &str, backup_suffix: &str) -> Result<Option<PathBuf>> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;

    let existing = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Some(meta),
        Ok(_) => {
            return Err(Error::InvalidInput(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Err(_) => None,
    };

    let backup = match &existing {
        Some(_) => {
            let backup = backup_path(path, backup_suffix);
            std::fs::copy(path, &backup).map_err(|e| Error::io(&backup, e))?;
            trace!(path = %path.display(), backup = %backup.display(), "backup written");
            Some(backup)
        }
        None => None,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| Error::io(&parent, e))?;
    tmp.write_all(text.as_bytes())
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;
    if let Some(meta) = &existing {
        std::fs::set_permissions(tmp.path(), meta.permissions())
            .map_err(|e| Error::io(tmp.path(), e))?;
    }
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;

    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/v/Note.md"), "bak"),
            PathBuf::from("/v/Note.md.bak")
        );
        assert_eq!(
            backup_path(Path::new("Note.md"), ".bak"),
            PathBuf::from("Note.md.bak")
        );
    }

    #[test]
    fn atomic_write_creates_then_backs_up_previous_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sub/Note.md");

        let backup = atomic_write(&path, "first\n", "bak").unwrap();
        assert!(backup.is_none());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");

        let backup = atomic_write(&path, "second\n", "bak").unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "first\n");

        // No stray temp files are left next to the note.
        let names: Vec<_> = std::fs::read_dir(temp.path().join("sub"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn read_text_replaces_invalid_utf8() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.md");
        std::fs::write(&path, b"ok \xff end").unwrap();
        let text = read_text(&path).unwrap();
        assert!(text.starts_with("ok "));
        assert!(text.ends_with(" end"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn timestamps_have_minute_precision() {
        let ts = now_timestamp();
        assert_eq!(ts.len(), 16);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[13..14], ":");
    }
}
