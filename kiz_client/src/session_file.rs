//! Token pair persisted between CLI invocations.
//!
//! The file holds a live refresh token, so on unix it is only readable by
//! its owner.

use anyhow::{Context, Result};
use kiz_session::auth::SessionTokens;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Saved pair, or `None` when there is no file or it cannot be parsed
pub fn load(path: &Path) -> Result<Option<SessionTokens>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str(&raw) {
        Ok(tokens) => Ok(Some(tokens)),
        Err(e) => {
            log::warn!("Ignoring unreadable session file {}: {e}", path.display());
            Ok(None)
        }
    }
}

/// Write the pair, or remove the file when there is none
pub fn save(path: &Path, tokens: Option<&SessionTokens>) -> Result<()> {
    match tokens {
        Some(tokens) => {
            let raw = serde_json::to_vec_pretty(tokens)?;
            write_private(path, &raw)
                .with_context(|| format!("Failed to write {}", path.display()))
        }
        None if path.exists() => std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display())),
        None => Ok(()),
    }
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // `mode` only applies on creation; tighten files left by older versions too
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)
}
