use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout of a reload root: deployed bundles, download cache and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadLayout {
    root: PathBuf,
}

impl ReloadLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.root.join("bundles")
    }

    pub fn bundle_dir(&self, id: &str) -> PathBuf {
        self.bundles_dir().join(id)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir().join("downloads")
    }

    pub fn archive_path(&self, id: &str) -> PathBuf {
        self.downloads_dir().join(format!("{id}.pkg"))
    }

    pub fn partial_archive_path(&self, id: &str) -> PathBuf {
        self.downloads_dir().join(format!("{id}.pkg.part"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.state_dir().join("packages")
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.records_dir().join(format!("{id}.record"))
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir().join("backups")
    }

    pub fn backup_path(&self, id: &str) -> PathBuf {
        self.backups_dir().join(id)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.state_dir().join("tmp")
    }

    pub fn install_staging_path(&self, id: &str) -> PathBuf {
        self.tmp_dir()
            .join(format!("install-{id}-{}", std::process::id()))
    }

    pub fn active_reload_path(&self) -> PathBuf {
        self.state_dir().join("reload.active")
    }

    pub fn install_after_restart_path(&self) -> PathBuf {
        self.state_dir().join("install-after-restart")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [
            self.bundles_dir(),
            self.cache_dir(),
            self.downloads_dir(),
            self.state_dir(),
            self.records_dir(),
            self.backups_dir(),
            self.tmp_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn default_user_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows reload root")?;
        return Ok(PathBuf::from(app_data).join("StudioReload"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve reload root")?;
    Ok(PathBuf::from(home).join(".studio-reload"))
}
