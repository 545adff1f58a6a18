pub mod task_tracker;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolves the gateway's on-disk home directory, honoring `MULTIGATE_HOME`
/// and otherwise defaulting to `~/.multigate`.
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("MULTIGATE_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::home_dir().context("could not determine home directory")?;
    Ok(base.join(".multigate"))
}

pub fn ensure_dir(path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Strips characters that are unsafe in a filename across common filesystems.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\0' => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Writes `content` to `path` atomically: a temp file in the same directory
/// is written, fsynced, given owner-only permissions, then renamed over the
/// destination. Readers never observe a partially written file.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().context("path has no parent directory")?;
    ensure_dir(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .context("failed to create temp file for atomic write")?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .context("failed to set temp file permissions")?;
        tmp.write_all(content.as_bytes())
            .context("failed to write temp file contents")?;
    }
    #[cfg(not(unix))]
    {
        use std::io::Write;
        tmp.write_all(content.as_bytes())
            .context("failed to write temp file contents")?;
    }

    tmp.as_file().sync_all().context("failed to sync temp file")?;
    tmp.persist(path)
        .with_context(|| format!("failed to persist atomic write to {}", path.display()))?;
    Ok(())
}

/// Truncates `s` to at most `max_chars` characters (UTF-8 safe), appending
/// `suffix` when truncation actually occurred.
pub fn truncate_chars(s: &str, max_chars: usize, suffix: &str) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut = s
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    format!("{}{}", &s[..cut], suffix)
}
