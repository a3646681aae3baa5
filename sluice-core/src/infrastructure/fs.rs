// sluice-core/src/infrastructure/fs.rs

use crate::infrastructure::error::InfrastructureError;
use std::io::Write;
use std::path::Path;

/// Replaces `path` with `content` in one rename, creating parent directories first.
///
/// Readers see either the previous file or the complete new one, never a partial
/// write. The registry and JSON sinks both rely on this.
pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
) -> Result<(), InfrastructureError> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    // Same directory as the target so the rename never crosses filesystems
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(content.as_ref())?;
    temp_file.flush()?;

    temp_file
        .persist(path)
        .map_err(|e| InfrastructureError::Io(e.error))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_missing_dirs() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("executions").join("abc.json");

        atomic_write(&file_path, "{}")?;

        assert_eq!(fs::read_to_string(file_path)?, "{}");
        Ok(())
    }

    #[test]
    fn test_atomic_write_overwrites_existing() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("schedules.yaml");

        atomic_write(&file_path, "before")?;
        atomic_write(&file_path, "after")?;

        assert_eq!(fs::read_to_string(&file_path)?, "after");
        // No stray temp files left behind
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
