use anyhow::{Context, Result};
use reload_core::InstallationLock;
use std::fs;
use std::io::{self, Write};
use tracing::{debug, info};

use crate::fs_utils::remove_file_if_exists;
use crate::ReloadLayout;

/// `state/reload.active`, created exclusively for the length of one reload.
///
/// The file holds the owning pid. A marker left by a crashed process has to
/// be removed by hand before the next reload can start.
#[derive(Debug, Clone)]
pub struct ActiveReloadMarker {
    layout: ReloadLayout,
}

impl ActiveReloadMarker {
    pub fn new(layout: ReloadLayout) -> Self {
        Self { layout }
    }

    /// Pid recorded by the current holder, if any.
    pub fn holder(&self) -> Result<Option<String>> {
        let path = self.layout.active_reload_path();
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw.trim().to_string()).filter(|pid| !pid.is_empty())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read reload marker: {}", path.display())),
        }
    }
}

impl InstallationLock for ActiveReloadMarker {
    fn try_lock(&self) -> Result<bool> {
        let path = self.layout.active_reload_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = self.holder().ok().flatten().unwrap_or_default();
                info!(path = %path.display(), holder = %holder, "reload marker already held");
                return Ok(false);
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to claim reload marker: {}", path.display())
                });
            }
        };

        file.write_all(format!("{}\n", std::process::id()).as_bytes())
            .with_context(|| format!("failed to write reload marker: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush reload marker: {}", path.display()))?;
        debug!(path = %path.display(), "reload marker claimed");
        Ok(true)
    }

    fn unlock(&self) -> Result<()> {
        let path = self.layout.active_reload_path();
        remove_file_if_exists(&path)
            .with_context(|| format!("failed to release reload marker: {}", path.display()))
    }
}
