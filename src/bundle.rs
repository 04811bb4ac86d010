//! Validate, stage, and atomically apply a gzip+tar config bundle (§4.4).

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};

/// Regular-file basenames a bundle must contain to be considered valid.
pub const REQUIRED_MEMBERS: [&str; 4] = ["config.yml", "ca.crt", "host.crt", "host.key"];

/// Validates, stages, and atomically swaps config bundles into a single
/// config directory. Bound to one `config_dir` for its lifetime.
pub struct BundleStore {
    config_dir: PathBuf,
}

impl BundleStore {
    pub fn new(config_dir: PathBuf) -> Self {
        BundleStore { config_dir }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// `apply(bundleBytes, version) -> ok | error`, atomic from the
    /// caller's perspective: either every required file ends up present in
    /// `config_dir`, or an error is returned and the caller should retry on
    /// the next poll.
    pub async fn apply(&self, bundle_bytes: &[u8], version: u64) -> Result<()> {
        validate(bundle_bytes)?;
        let config_dir = self.config_dir.clone();
        let bundle = bundle_bytes.to_vec();
        tokio::task::spawn_blocking(move || apply_blocking(&config_dir, &bundle, version))
            .await
            .map_err(|e| AgentError::Io(format!("bundle apply task panicked: {e}")))??;
        info!(version, "bundle applied");
        Ok(())
    }
}

fn sibling_path(base: &Path, suffix: &str) -> PathBuf {
    let file_name = base
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    base.with_file_name(format!("{file_name}.{suffix}"))
}

/// Decode gzip, walk tar entries to EOF, and return the basenames of every
/// regular-file entry. Rejects if the required set is not a subset.
fn validate(bundle_bytes: &[u8]) -> Result<()> {
    let decoder = GzDecoder::new(bundle_bytes);
    let mut archive = Archive::new(decoder);
    let mut names = HashSet::new();
    let entries = archive
        .entries()
        .map_err(|e| AgentError::BundleInvalid(format!("gzip/tar decode failed: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| AgentError::BundleInvalid(format!("tar decode failed: {e}")))?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| AgentError::BundleInvalid(format!("invalid tar entry path: {e}")))?;
        if let Some(basename) = path.file_name() {
            names.insert(basename.to_string_lossy().to_string());
        }
    }
    for required in REQUIRED_MEMBERS {
        if !names.contains(required) {
            return Err(AgentError::BundleInvalid(format!(
                "bundle missing required member: {required}"
            )));
        }
    }
    Ok(())
}

/// Runs on a blocking thread: stage, extract, re-verify, swap, post-commit.
fn apply_blocking(config_dir: &Path, bundle_bytes: &[u8], version: u64) -> Result<()> {
    let stage_dir = sibling_path(config_dir, &format!("tmp.{version}"));
    let backup_dir = sibling_path(config_dir, "old");

    if stage_dir.exists() {
        std::fs::remove_dir_all(&stage_dir)?;
    }
    std::fs::create_dir(&stage_dir)?;
    let mut perms = std::fs::metadata(&stage_dir)?.permissions();
    set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&stage_dir, perms)?;

    if let Err(e) = extract(bundle_bytes, &stage_dir) {
        let _ = std::fs::remove_dir_all(&stage_dir);
        return Err(e);
    }

    for required in REQUIRED_MEMBERS {
        if !stage_dir.join(required).is_file() {
            let _ = std::fs::remove_dir_all(&stage_dir);
            return Err(AgentError::BundleInvalid(format!(
                "required member missing after extraction: {required}"
            )));
        }
    }

    if backup_dir.exists() {
        std::fs::remove_dir_all(&backup_dir)?;
    }
    let had_live_dir = config_dir.exists();
    if had_live_dir {
        if let Err(e) = std::fs::rename(config_dir, &backup_dir) {
            let _ = std::fs::remove_dir_all(&stage_dir);
            return Err(AgentError::Io(format!("failed to back up live config dir: {e}")));
        }
    }
    if let Err(e) = std::fs::rename(&stage_dir, config_dir) {
        // Best-effort one-shot rollback: restore the backup if we made one.
        if had_live_dir {
            let _ = std::fs::rename(&backup_dir, config_dir);
        }
        return Err(AgentError::Io(format!("failed to activate staged config dir: {e}")));
    }

    if had_live_dir {
        // Post-commit: delete the backup on a detached thread so the apply
        // itself doesn't wait on it. Leaking a backup directory on failure
        // here is not fatal; log and move on.
        std::thread::spawn(move || {
            if let Err(e) = std::fs::remove_dir_all(&backup_dir) {
                warn!(error = %e, dir = %backup_dir.display(), "failed to remove backup config dir");
            } else {
                debug!(dir = %backup_dir.display(), "removed backup config dir");
            }
        });
    }
    Ok(())
}

/// Re-iterate the archive, writing each regular-file entry to
/// `{stage}/{basename}`. Directory components in the entry name are never
/// honored — this defeats path traversal (P6).
fn extract(bundle_bytes: &[u8], stage_dir: &Path) -> Result<()> {
    let decoder = GzDecoder::new(bundle_bytes);
    let mut archive = Archive::new(decoder);
    let entries = archive
        .entries()
        .map_err(|e| AgentError::BundleInvalid(format!("gzip/tar decode failed: {e}")))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| AgentError::BundleInvalid(format!("tar decode failed: {e}")))?;
        let entry_type = entry.header().entry_type();
        let path = entry
            .path()
            .map_err(|e| AgentError::BundleInvalid(format!("invalid tar entry path: {e}")))?
            .into_owned();
        let Some(basename) = path.file_name() else {
            continue;
        };
        let dest = stage_dir.join(basename);
        match entry_type {
            EntryType::Regular => {
                let mode = entry.header().mode().unwrap_or(0o644);
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents)?;
                std::fs::write(&dest, &contents)?;
                let mut perms = std::fs::metadata(&dest)?.permissions();
                set_mode(&mut perms, mode);
                std::fs::set_permissions(&dest, perms)?;
            }
            EntryType::Directory => {
                std::fs::create_dir_all(&dest)?;
            }
            _ => continue,
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(perms: &mut std::fs::Permissions, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(mode);
}

#[cfg(not(unix))]
fn set_mode(_perms: &mut std::fs::Permissions, _mode: u32) {}
