use std::io;

use anyhow::{anyhow, bail, Context, Result};
use reload_core::RemotePackageSource;
use reload_installer::{
    default_user_root, ActiveReloadMarker, InstallAfterRestart, LocalPackageService, ReloadLayout,
};
use reload_operation::{
    Principal, ReloadCoordinator, ReloadOutcome, ReloadRequest, OPERATION_ID,
};
use reload_registry::RemoteCatalog;
use tracing::{debug, info};

use crate::completion::write_completions_script;
use crate::config::{Overrides, ReloadConfig};
use crate::render::{
    format_queue_lines, format_reload_outcome_lines, format_remote_lines, format_status_lines,
    status_json, TerminalRenderer,
};
use crate::{Cli, Commands};

pub(crate) type StudioReloadCoordinator =
    ReloadCoordinator<RemoteCatalog, LocalPackageService, InstallAfterRestart>;

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Reload { validate, user } => {
            let (layout, config) = load_settings(&cli)?;
            let principal = config.principal(&resolve_user(user.clone())?);
            run_reload_command(&layout, &config, &principal, ReloadRequest::new(*validate))?;
        }
        Commands::Invoke {
            operation,
            params,
            user,
        } => {
            if operation != OPERATION_ID {
                bail!("unknown operation '{operation}'; expected {OPERATION_ID}");
            }
            let pairs = params
                .iter()
                .map(|param| parse_param(param))
                .collect::<Result<Vec<_>>>()?;
            let request = ReloadRequest::from_params(pairs)?;
            let (layout, config) = load_settings(&cli)?;
            let principal = config.principal(&resolve_user(user.clone())?);
            run_reload_command(&layout, &config, &principal, request)?;
        }
        Commands::Remote => {
            let (layout, config) = load_settings(&cli)?;
            let catalog = RemoteCatalog::new(config.catalog_location()?, layout);
            let packages = catalog.list_remote_studio_packages()?;
            let lines = format_remote_lines(&packages, config.platform.target.as_deref());
            TerminalRenderer::current().print_lines(&lines);
        }
        Commands::Status { json } => {
            let (layout, _) = load_settings(&cli)?;
            let packages = LocalPackageService::new(layout.clone()).list_packages()?;
            let queued = InstallAfterRestart::new(layout).pending()?;
            if *json {
                let rendered = serde_json::to_string_pretty(&status_json(&packages, &queued))
                    .context("failed to render status as JSON")?;
                println!("{rendered}");
            } else {
                TerminalRenderer::current().print_lines(&format_status_lines(&packages, &queued));
            }
        }
        Commands::Queue { clear } => {
            let (layout, _) = load_settings(&cli)?;
            TerminalRenderer::current().print_lines(&restart_queue_lines(layout, *clear)?);
        }
        Commands::Completions { shell } => {
            write_completions_script(*shell, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

/// Resolves the reload root and the effective config, flags over file values.
pub(crate) fn load_settings(cli: &Cli) -> Result<(ReloadLayout, ReloadConfig)> {
    let layout = ReloadLayout::new(match &cli.root {
        Some(root) => root.clone(),
        None => default_user_root()?,
    });
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| layout.config_path());
    let config = ReloadConfig::load(&config_path)?.apply(&Overrides {
        catalog: cli.catalog.clone(),
        target_platform: cli.target_platform.clone(),
        dev_mode: cli.dev_mode,
    });
    debug!(root = %layout.root().display(), config = %config_path.display(), "resolved settings");
    Ok((layout, config))
}

fn run_reload_command(
    layout: &ReloadLayout,
    config: &ReloadConfig,
    principal: &Principal,
    request: ReloadRequest,
) -> Result<()> {
    let renderer = TerminalRenderer::current();
    let spinner = renderer.start_spinner("reloading studio snapshot");
    let result = execute_reload(layout, config, principal, request);
    spinner.finish();

    let outcome = result?;
    renderer.print_lines(&format_reload_outcome_lines(&outcome, renderer.style()));
    Ok(())
}

pub(crate) fn build_coordinator(
    layout: &ReloadLayout,
    config: &ReloadConfig,
) -> Result<StudioReloadCoordinator> {
    layout.ensure_base_dirs()?;
    let remote = RemoteCatalog::new(config.catalog_location()?, layout.clone());
    Ok(ReloadCoordinator::new(
        remote,
        LocalPackageService::new(layout.clone()),
        InstallAfterRestart::new(layout.clone()),
        config.platform_info(),
    )
    .with_download_timeout(config.download_timeout()?)
    .with_installation_lock(ActiveReloadMarker::new(layout.clone())))
}

/// Runs one reload against the configured services.
pub(crate) fn execute_reload(
    layout: &ReloadLayout,
    config: &ReloadConfig,
    principal: &Principal,
    request: ReloadRequest,
) -> Result<ReloadOutcome> {
    let coordinator = build_coordinator(layout, config)?;
    Ok(coordinator.reload(principal, &request)?)
}

/// Lists the restart queue, emptying it first when `clear` is set.
pub(crate) fn restart_queue_lines(layout: ReloadLayout, clear: bool) -> Result<Vec<String>> {
    let queue = InstallAfterRestart::new(layout);
    let ids = if clear {
        let removed = queue.clear()?;
        info!(count = removed.len(), "cleared restart queue");
        removed
    } else {
        queue.pending()?
    };
    Ok(format_queue_lines(&ids, clear))
}

pub(crate) fn parse_param(param: &str) -> Result<(&str, &str)> {
    let (key, value) = param
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid parameter '{param}'; expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid parameter '{param}'; key must not be empty");
    }
    Ok((key, value.trim()))
}

pub(crate) fn resolve_user(explicit: Option<String>) -> Result<String> {
    if let Some(user) = explicit.filter(|user| !user.trim().is_empty()) {
        return Ok(user);
    }
    ["USER", "USERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|user| !user.is_empty()))
        .ok_or_else(|| anyhow!("cannot determine the current user; pass --user"))
}
