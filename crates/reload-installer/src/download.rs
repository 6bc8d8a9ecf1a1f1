use anyhow::{anyhow, bail, Context, Result};
use reload_core::{download_channel, DownloadCompleter, DownloadHandle, PackageState, RemotePackage};
use reload_security::verify_sha256_file;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, warn};

use crate::fs_utils::{current_unix_timestamp, remove_file_if_exists};
use crate::records::{
    read_package_record, remove_package_record, write_package_record, LocalPackageRecord,
};
use crate::ReloadLayout;

/// Starts downloading `package` on a worker thread.
///
/// The returned handle completes once the archive is verified and the local
/// record reaches `downloaded`. A failed download leaves no record behind, and
/// neither does one whose waiter timed out.
pub fn spawn_download(layout: &ReloadLayout, package: RemotePackage) -> Result<DownloadHandle> {
    let (completer, handle) = download_channel(package.id.clone());
    let cancel_layout = layout.clone();
    let cancel_id = package.id.clone();
    let handle = handle.on_cancel(move || {
        warn!(package = %cancel_id, "download abandoned by waiter; discarding partial state");
        cleanup_failed_download(&cancel_layout, &cancel_id);
    });
    let layout = layout.clone();
    let worker_name = format!("download-{}", package.id);

    thread::Builder::new()
        .name(worker_name)
        .spawn(move || {
            let result = download_package(&layout, &package, &completer);
            if let Err(err) = &result {
                warn!(package = %package.id, error = %format!("{err:#}"), "download failed");
                cleanup_failed_download(&layout, &package.id);
            }
            completer.complete(result);
        })
        .context("failed to spawn download worker")?;

    Ok(handle)
}

fn download_package(
    layout: &ReloadLayout,
    package: &RemotePackage,
    completer: &DownloadCompleter,
) -> Result<()> {
    fs::create_dir_all(layout.downloads_dir()).with_context(|| {
        format!(
            "failed to create download cache: {}",
            layout.downloads_dir().display()
        )
    })?;

    let mut record = LocalPackageRecord {
        id: package.id.clone(),
        name: package.name.clone(),
        version: package.version.to_string(),
        state: PackageState::Downloading,
        archive_path: None,
        sha256: Some(package.sha256.clone()),
        updated_at_unix: current_unix_timestamp()?,
    };
    write_package_record(layout, &record)?;
    ensure_not_cancelled(completer, &package.id)?;

    let part_path = layout.partial_archive_path(&package.id);
    debug!(package = %package.id, url = %package.url, "fetching package archive");
    fetch_to(&package.url, &part_path, completer, &package.id)?;

    if let Some(expected_size) = package.size {
        let actual_size = fs::metadata(&part_path)
            .with_context(|| format!("failed to stat {}", part_path.display()))?
            .len();
        if actual_size != expected_size {
            return Err(anyhow!(
                "downloaded size mismatch for '{}': expected {expected_size} bytes, got {actual_size}",
                package.id
            ));
        }
    }
    if !verify_sha256_file(&part_path, &package.sha256)? {
        return Err(anyhow!(
            "downloaded checksum mismatch for '{}': expected {}",
            package.id,
            package.sha256
        ));
    }

    ensure_not_cancelled(completer, &package.id)?;
    let archive_path = layout.archive_path(&package.id);
    remove_file_if_exists(&archive_path)
        .with_context(|| format!("failed to replace archive: {}", archive_path.display()))?;
    fs::rename(&part_path, &archive_path).with_context(|| {
        format!(
            "failed to move downloaded archive into cache: {}",
            archive_path.display()
        )
    })?;

    record.state = PackageState::Downloaded;
    record.archive_path = Some(archive_path.display().to_string());
    record.updated_at_unix = current_unix_timestamp()?;
    write_package_record(layout, &record)?;

    info!(package = %package.id, "package downloaded");
    Ok(())
}

fn cleanup_failed_download(layout: &ReloadLayout, id: &str) {
    let _ = remove_file_if_exists(&layout.partial_archive_path(id));
    let still_downloading = read_package_record(layout, id)
        .ok()
        .flatten()
        .is_some_and(|record| record.state == PackageState::Downloading);
    if still_downloading {
        let _ = remove_package_record(layout, id);
    }
}

fn ensure_not_cancelled(completer: &DownloadCompleter, id: &str) -> Result<()> {
    if completer.is_cancelled() {
        bail!("download of '{id}' was cancelled");
    }
    Ok(())
}

fn fetch_to(url: &str, out_path: &Path, completer: &DownloadCompleter, id: &str) -> Result<()> {
    let mut out = fs::File::create(out_path)
        .with_context(|| format!("failed to create {}", out_path.display()))?;

    if url.starts_with("http://") || url.starts_with("https://") {
        let mut response = reqwest::blocking::get(url)
            .with_context(|| format!("failed to request package archive: {url}"))?
            .error_for_status()
            .with_context(|| format!("package archive request was rejected: {url}"))?;
        copy_until_cancelled(&mut response, &mut out, completer, id)
            .with_context(|| format!("failed to stream package archive from {url}"))?;
    } else {
        let source = local_source_path(url);
        let mut input = fs::File::open(&source).with_context(|| {
            format!("failed to open package archive: {}", source.display())
        })?;
        copy_until_cancelled(&mut input, &mut out, completer, id).with_context(|| {
            format!(
                "failed to copy package archive from {} to {}",
                source.display(),
                out_path.display()
            )
        })?;
    }

    out.flush()
        .with_context(|| format!("failed to flush {}", out_path.display()))?;
    Ok(())
}

fn copy_until_cancelled(
    reader: &mut impl Read,
    writer: &mut impl Write,
    completer: &DownloadCompleter,
    id: &str,
) -> Result<u64> {
    let mut buffer = vec![0_u8; 64 * 1024];
    let mut copied = 0_u64;
    loop {
        ensure_not_cancelled(completer, id)?;
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(copied),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
    }
}

pub(crate) fn local_source_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
}
