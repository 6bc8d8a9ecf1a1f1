use anyhow::{Context, Result};
use reload_core::RestartQueue;
use std::fs;
use std::io::{self, Write};
use tracing::info;

use crate::fs_utils::remove_file_if_exists;
use crate::ReloadLayout;

/// Packages queued for installation at the next host restart, one id per line.
#[derive(Debug, Clone)]
pub struct InstallAfterRestart {
    layout: ReloadLayout,
}

impl InstallAfterRestart {
    pub fn new(layout: ReloadLayout) -> Self {
        Self { layout }
    }

    pub fn pending(&self) -> Result<Vec<String>> {
        let path = self.layout.install_after_restart_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read restart queue: {}", path.display())
                });
            }
        };

        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    /// Empties the queue, returning what was pending.
    pub fn clear(&self) -> Result<Vec<String>> {
        let pending = self.pending()?;
        let path = self.layout.install_after_restart_path();
        remove_file_if_exists(&path)
            .with_context(|| format!("failed to clear restart queue: {}", path.display()))?;
        Ok(pending)
    }
}

impl RestartQueue for InstallAfterRestart {
    fn add_package_for_installation(&self, id: &str) -> Result<()> {
        if self.pending()?.iter().any(|pending| pending == id) {
            info!(package = %id, "package already queued for install after restart");
            return Ok(());
        }

        let path = self.layout.install_after_restart_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open restart queue: {}", path.display()))?;
        file.write_all(format!("{id}\n").as_bytes())
            .with_context(|| format!("failed to append restart queue: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush restart queue: {}", path.display()))?;

        info!(package = %id, "package queued for install after restart");
        Ok(())
    }
}
