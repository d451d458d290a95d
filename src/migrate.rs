//! Asset copying for migrate steps.
//! Thin collaborator whose failure-handling policy is part of the pipeline
//! contract: the missing-source response is selectable per step.

use crate::error::{Error, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// What to do when a migrate step's source does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingSourcePolicy {
    /// Fatal; aborts the plan. The default.
    #[default]
    Exit,
    /// Log a warning and continue with the next step.
    Warn,
    /// Silently continue.
    Skip,
}

impl MissingSourcePolicy {
    pub fn from_option(name: Option<&str>) -> Self {
        match name {
            Some("warn") => Self::Warn,
            Some("skip") => Self::Skip,
            _ => Self::Exit,
        }
    }
}

/// Performs recursive-aware copies for migrate steps.
pub struct AssetMigrator;

impl AssetMigrator {
    pub fn new() -> Self {
        Self
    }

    /// Copies `source` to `target`.
    ///
    /// A file source is copied to the target path. A directory source is
    /// copied as the directory itself when `inclusive`, or as its contents
    /// (trailing `/.` semantics) when not.
    pub fn copy(
        &self,
        source: &Path,
        target: &Path,
        inclusive: bool,
        missing: MissingSourcePolicy,
    ) -> Result<()> {
        if !source.exists() {
            return match missing {
                MissingSourcePolicy::Exit => {
                    Err(Error::MigrateSourceMissing { path: source.to_path_buf() })
                }
                MissingSourcePolicy::Warn => {
                    warn!("Migrate source {} does not exist; skipping", source.display());
                    Ok(())
                }
                MissingSourcePolicy::Skip => Ok(()),
            };
        }

        debug!("Copying {} to {}", source.display(), target.display());
        if source.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source, target)?;
        } else {
            let dest_root = if inclusive {
                match source.file_name() {
                    Some(name) => target.join(name),
                    None => target.to_path_buf(),
                }
            } else {
                target.to_path_buf()
            };
            copy_dir(source, &dest_root)?;
        }
        info!("Copied {} to {}.", source.display(), target.display());
        Ok(())
    }
}

impl Default for AssetMigrator {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_dir(source: &Path, dest_root: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| Error::IoError(std::io::Error::other(e)))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::IoError(std::io::Error::other(e)))?;
        let dest = dest_root.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
