//! Atomic file writing for build output.
//!
//! Every artifact is first written next to its destination as a temporary
//! file. Only when all temporary files exist are they renamed into place.
//! If anything fails, temporary files and already renamed artifacts are
//! removed again, so a failed write leaves no partial output behind.
//!
//! All paths are validated to stay inside the package root.

use std::fs;
use std::path::{Path, PathBuf};

use path_clean::PathClean;

use super::Artifact;
use crate::{Error, Result};

/// Validates an output path to prevent writes outside the package root.
///
/// `path` may be absolute or relative to `root`. The cleaned result must
/// still be under `root`.
pub fn validate_output_path(root: &Path, path: &Path) -> Result<PathBuf> {
    if path.as_os_str().to_string_lossy().contains('\0') {
        return Err(Error::InvalidOutputPath(
            "Filename contains null byte".to_string(),
        ));
    }

    #[cfg(target_os = "windows")]
    {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_uppercase())
            .unwrap_or_default();
        let device_names = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        if device_names.contains(&stem.as_str()) {
            return Err(Error::InvalidOutputPath(format!(
                "Filename is a reserved device name: {}",
                path.display()
            )));
        }
    }

    let root = root.clean();
    let full_path = root.join(path).clean();

    if !full_path.starts_with(&root) || full_path == root {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes package root '{}' (resolved to '{}')",
            path.display(),
            root.display(),
            full_path.display()
        )));
    }

    Ok(full_path)
}

/// Empty the output directory, keeping the directory itself.
pub fn clean_dir(root: &Path, dir: &Path) -> Result<()> {
    let dir = validate_output_path(root, dir)?;
    if !dir.is_dir() {
        return Ok(());
    }
    let entries = fs::read_dir(&dir).map_err(|e| {
        Error::WriteFailure(format!("Failed to read '{}': {}", dir.display(), e))
    })?;
    for entry in entries {
        let path = entry?.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| {
            Error::WriteFailure(format!("Failed to remove '{}': {}", path.display(), e))
        })?;
    }
    tracing::debug!(dir = %dir.display(), "cleaned output directory");
    Ok(())
}

/// Remove files that must not exist after the build (e.g. declarations
/// whose generation failed). Missing files are fine.
pub fn remove_stale(root: &Path, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let path = validate_output_path(root, path)?;
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| {
                Error::WriteFailure(format!("Failed to remove '{}': {}", path.display(), e))
            })?;
            tracing::debug!(path = %path.display(), "removed stale output");
        }
    }
    Ok(())
}

/// Writes all artifacts atomically with automatic rollback on failure.
///
/// This function uses a two-phase commit:
/// 1. Write all content to temporary files (`<name>.tmp`)
/// 2. If all writes succeed, rename temp files to final names
/// 3. If any operation fails, delete temp files and renamed artifacts
pub fn write_artifacts(root: &Path, artifacts: &[Artifact]) -> Result<()> {
    let mut targets = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        targets.push(validate_output_path(root, &artifact.path)?);
    }

    let mut temp_files: Vec<(PathBuf, &PathBuf)> = Vec::new();

    // Phase 1: Write to temporary files
    for (artifact, target_path) in artifacts.iter().zip(&targets) {
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                cleanup(&temp_files, &[]);
                Error::WriteFailure(format!(
                    "Failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp_path = temp_path_for(target_path);
        fs::write(&temp_path, artifact.contents.as_bytes()).map_err(|e| {
            cleanup(&temp_files, &[]);
            Error::WriteFailure(format!(
                "Failed to write temporary file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;

        temp_files.push((temp_path, target_path));
    }

    // Phase 2: Rename temp files to final names
    let mut renamed: Vec<&Path> = Vec::new();
    for (temp_path, target_path) in &temp_files {
        fs::rename(temp_path, target_path).map_err(|e| {
            cleanup(&temp_files, &renamed);
            Error::WriteFailure(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                target_path.display(),
                e
            ))
        })?;
        renamed.push(target_path.as_path());
    }

    for (artifact, target_path) in artifacts.iter().zip(&targets) {
        if artifact.executable {
            make_executable(target_path)?;
        }
    }

    Ok(())
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
        Error::WriteFailure(format!(
            "Failed to mark '{}' executable: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Best-effort rollback; errors are logged since we're already failing.
fn cleanup(temp_files: &[(PathBuf, &PathBuf)], renamed: &[&Path]) {
    let leftovers = temp_files
        .iter()
        .map(|(temp, _)| temp.as_path())
        .chain(renamed.iter().copied());
    for path in leftovers {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to clean up after write failure"
                );
            }
        }
    }
}
