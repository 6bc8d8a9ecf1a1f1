use anyhow::{anyhow, Context, Result};
use reload_core::{LocalPackage, PackageState};
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::fs_utils::{current_unix_timestamp, remove_file_if_exists};
use crate::ReloadLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackageRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub state: PackageState,
    pub archive_path: Option<String>,
    pub sha256: Option<String>,
    pub updated_at_unix: u64,
}

impl LocalPackageRecord {
    pub fn to_local_package(&self) -> LocalPackage {
        LocalPackage {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            state: self.state,
        }
    }
}

pub fn write_package_record(layout: &ReloadLayout, record: &LocalPackageRecord) -> Result<PathBuf> {
    let mut payload = String::new();
    payload.push_str(&format!("id={}\n", record.id));
    payload.push_str(&format!("name={}\n", record.name));
    payload.push_str(&format!("version={}\n", record.version));
    payload.push_str(&format!("state={}\n", record.state.as_str()));
    if let Some(archive_path) = &record.archive_path {
        payload.push_str(&format!("archive_path={archive_path}\n"));
    }
    if let Some(sha256) = &record.sha256 {
        payload.push_str(&format!("sha256={sha256}\n"));
    }
    payload.push_str(&format!("updated_at_unix={}\n", record.updated_at_unix));

    let path = layout.record_path(&record.id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, payload.as_bytes())
        .with_context(|| format!("failed to write package record: {}", path.display()))?;
    Ok(path)
}

pub fn read_package_record(layout: &ReloadLayout, id: &str) -> Result<Option<LocalPackageRecord>> {
    let path = layout.record_path(id);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read package record: {}", path.display()));
        }
    };

    let record = parse_record(&raw)
        .with_context(|| format!("failed to parse package record: {}", path.display()))?;
    if record.id != id {
        return Err(anyhow!(
            "package record {} belongs to '{}', expected '{id}'",
            path.display(),
            record.id
        ));
    }
    Ok(Some(record))
}

pub fn read_package_records(layout: &ReloadLayout) -> Result<Vec<LocalPackageRecord>> {
    let dir = layout.records_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(&dir)
        .with_context(|| format!("failed to read package records directory: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|v| v.to_str()) != Some("record") {
            continue;
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read package record: {}", path.display()))?;
        let record = parse_record(&raw)
            .with_context(|| format!("failed to parse package record: {}", path.display()))?;
        records.push(record);
    }

    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(records)
}

pub fn remove_package_record(layout: &ReloadLayout, id: &str) -> Result<()> {
    let path = layout.record_path(id);
    remove_file_if_exists(&path)
        .with_context(|| format!("failed to remove package record: {}", path.display()))
}

/// Rewrites the state of an existing record and bumps its timestamp.
pub fn update_record_state(
    layout: &ReloadLayout,
    id: &str,
    state: PackageState,
) -> Result<LocalPackageRecord> {
    let mut record = read_package_record(layout, id)?
        .ok_or_else(|| anyhow!("package record not found for '{id}'"))?;
    record.state = state;
    record.updated_at_unix = current_unix_timestamp()?;
    write_package_record(layout, &record)?;
    Ok(record)
}

pub(crate) fn parse_record(raw: &str) -> Result<LocalPackageRecord> {
    let mut id = None;
    let mut name = None;
    let mut version = None;
    let mut state = None;
    let mut archive_path = None;
    let mut sha256 = None;
    let mut updated_at_unix = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        match k {
            "id" => id = Some(v.to_string()),
            "name" => name = Some(v.to_string()),
            "version" => version = Some(v.to_string()),
            "state" => state = Some(PackageState::parse(v)?),
            "archive_path" => archive_path = Some(v.to_string()),
            "sha256" => sha256 = Some(v.to_string()),
            "updated_at_unix" => {
                updated_at_unix = Some(v.parse().context("updated_at_unix must be u64")?)
            }
            _ => {}
        }
    }

    let id: String = id.context("missing id")?;
    Ok(LocalPackageRecord {
        name: name.unwrap_or_else(|| id.clone()),
        id,
        version: version.context("missing version")?,
        state: state.context("missing state")?,
        archive_path,
        sha256,
        updated_at_unix: updated_at_unix.unwrap_or(0),
    })
}
