use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use reload_core::{is_compatible_with_target_platform, LocalPackage, RemotePackage};
use reload_operation::ReloadOutcome;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct ReloadSpinner {
    progress_bar: Option<ProgressBar>,
}

impl TerminalRenderer {
    pub(crate) fn current() -> Self {
        Self {
            style: current_output_style(),
        }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_spinner(self, message: &str) -> ReloadSpinner {
        if self.style == OutputStyle::Plain {
            return ReloadSpinner { progress_bar: None };
        }

        let progress_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed}") {
            progress_bar.set_style(style.tick_chars(".oO@* "));
        }
        progress_bar.set_message(message.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        ReloadSpinner {
            progress_bar: Some(progress_bar),
        }
    }
}

impl ReloadSpinner {
    pub(crate) fn finish(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal())
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

/// `[OK] message` in rich mode, the bare message otherwise.
pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn render_colored_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => render_status_line(style, status, message),
        OutputStyle::Rich => format!(
            "{} {message}",
            colorize(status_style(status), &status_badge(status))
        ),
    }
}

fn status_badge(status: &str) -> String {
    format!("[{}]", status.to_ascii_uppercase())
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "error" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn format_reload_outcome_lines(outcome: &ReloadOutcome, style: OutputStyle) -> Vec<String> {
    let line = match outcome {
        ReloadOutcome::Installed {
            package_id,
            replaced_version: Some(version),
        } => render_colored_status_line(
            style,
            "ok",
            &format!("reloaded {package_id} (replaced {version})"),
        ),
        ReloadOutcome::Installed {
            package_id,
            replaced_version: None,
        } => render_colored_status_line(style, "ok", &format!("installed {package_id}")),
        ReloadOutcome::QueuedForRestart { package_id } => render_colored_status_line(
            style,
            "ok",
            &format!("queued {package_id} for install after restart"),
        ),
        ReloadOutcome::AlreadyInProgress => render_colored_status_line(
            style,
            "warn",
            "a studio snapshot reload is already in progress",
        ),
    };
    vec![line]
}

pub(crate) fn format_remote_lines(
    packages: &[RemotePackage],
    target_platform: Option<&str>,
) -> Vec<String> {
    if packages.is_empty() {
        return vec!["No remote studio packages".to_string()];
    }

    packages
        .iter()
        .map(|package| {
            let mut line = format!("{} {}", package.id, package.version);
            if package.is_snapshot() {
                line.push_str(" [snapshot]");
            }
            if !is_compatible_with_target_platform(package, target_platform) {
                line.push_str(" [incompatible]");
            }
            line
        })
        .collect()
}

pub(crate) fn format_status_lines(packages: &[LocalPackage], queued: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    if packages.is_empty() {
        lines.push("No local packages".to_string());
    }
    for package in packages {
        lines.push(package.to_string());
    }
    for id in queued {
        lines.push(format!("queued for restart: {id}"));
    }
    lines
}

pub(crate) fn format_queue_lines(ids: &[String], cleared: bool) -> Vec<String> {
    if ids.is_empty() {
        return vec!["No installs queued for restart".to_string()];
    }
    let verb = if cleared { "removed from restart queue" } else { "queued for restart" };
    ids.iter().map(|id| format!("{verb}: {id}")).collect()
}

pub(crate) fn status_json(packages: &[LocalPackage], queued: &[String]) -> serde_json::Value {
    serde_json::json!({
        "packages": packages
            .iter()
            .map(|package| serde_json::json!({
                "id": package.id,
                "name": package.name,
                "version": package.version,
                "state": package.state.as_str(),
            }))
            .collect::<Vec<_>>(),
        "install_after_restart": queued,
    })
}
