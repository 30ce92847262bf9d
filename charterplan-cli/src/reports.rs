use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;

use charterplan_core::{
    Catalog, CharterOption, ContributionKind, CoverageStats, ImportReport, Optimization, Overlap,
    Provider, ProviderGain, SessionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored terminal output
    Console,
    /// Pretty-printed JSON
    Json,
    /// Markdown tables
    Markdown,
}

fn provider_label(catalog: &Catalog, key: &str) -> String {
    catalog
        .provider(key)
        .map_or_else(|| key.to_string(), |p| format!("{} [{}]", p.name, p.key))
}

fn capability_label(catalog: &Catalog, key: &str) -> String {
    catalog
        .capability(key)
        .map_or_else(|| key.to_string(), |c| c.name.clone())
}

fn capability_list(catalog: &Catalog, keys: &[String]) -> String {
    keys.iter()
        .map(|key| capability_label(catalog, key))
        .collect::<Vec<_>>()
        .join(", ")
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        100.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct SelectedRow<'a> {
    position: usize,
    provider: &'a str,
    name: &'a str,
    charter: Option<&'a str>,
    free: bool,
    visible: bool,
}

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    budget: usize,
    paid: usize,
    stats: CoverageStats,
    selection: Vec<SelectedRow<'a>>,
}

fn status_view<'a>(
    catalog: &'a Catalog,
    session: &'a SessionState,
    budget: usize,
) -> StatusView<'a> {
    let selection = session.selection();
    let rows = selection
        .providers()
        .iter()
        .enumerate()
        .map(|(idx, key)| {
            let entry = catalog.provider(key);
            SelectedRow {
                position: idx + 1,
                provider: key,
                name: entry.map_or(key.as_str(), |p| p.name.as_str()),
                charter: selection.charter_of(key).map(String::as_str),
                free: entry.is_some_and(|p| p.free),
                visible: session.filter().is_provider_enabled(key),
            }
        })
        .collect();
    StatusView {
        budget,
        paid: selection.paid_count(catalog),
        stats: session.stats(catalog),
        selection: rows,
    }
}

/// Coverage summary plus the ordered selection.
pub fn write_status<W: Write>(
    out: &mut W,
    format: ReportFormat,
    catalog: &Catalog,
    session: &SessionState,
    budget: usize,
) -> Result<()> {
    let view = status_view(catalog, session, budget);
    let stats = &view.stats;
    match format {
        ReportFormat::Json => write_json(out, &view),
        ReportFormat::Markdown => {
            writeln!(out, "# Charterplan Status\n")?;
            writeln!(out, "- **Coverage:** {}/{}", stats.covered, stats.targets)?;
            if stats.priority_targets > 0 {
                writeln!(
                    out,
                    "- **Priority:** {}/{}",
                    stats.priority_covered, stats.priority_targets
                )?;
            }
            writeln!(out, "- **Paid slots:** {}/{}\n", view.paid, view.budget)?;
            writeln!(out, "| # | Provider | Charter | Free | Visible |")?;
            writeln!(out, "|---|----------|---------|------|---------|")?;
            for row in &view.selection {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} |",
                    row.position,
                    row.name,
                    row.charter
                        .map_or_else(|| "-".to_string(), |c| capability_label(catalog, c)),
                    if row.free { "yes" } else { "no" },
                    if row.visible { "yes" } else { "no" }
                )?;
            }
            if !stats.uncovered.is_empty() {
                writeln!(out, "\n## Uncovered\n")?;
                for key in &stats.uncovered {
                    writeln!(out, "- {}", capability_label(catalog, key))?;
                }
            }
            if !stats.requirements_met() {
                writeln!(out, "\n## Missing Prestige Goods\n")?;
                for key in &stats.missing_prestige {
                    writeln!(out, "- {}", capability_label(catalog, key))?;
                }
            }
            Ok(())
        }
        ReportFormat::Console => {
            writeln!(out, "{}", "📋 Charterplan Session".bright_cyan().bold())?;
            writeln!(out, "{}", "=====================".cyan())?;
            let coverage = format!("{}/{}", stats.covered, stats.targets);
            let coverage = if stats.is_complete() {
                coverage.green()
            } else {
                coverage.yellow()
            };
            writeln!(
                out,
                "Coverage: {coverage} ({:.1}%)",
                percent(stats.covered, stats.targets)
            )?;
            if stats.priority_targets > 0 {
                writeln!(
                    out,
                    "Priority: {}/{}",
                    stats.priority_covered, stats.priority_targets
                )?;
            }
            writeln!(out, "Paid slots: {}/{}", view.paid, view.budget)?;
            writeln!(out)?;
            if view.selection.is_empty() {
                writeln!(out, "No providers selected.")?;
            } else {
                writeln!(out, "{}", "Selected providers:".bold())?;
            }
            for row in &view.selection {
                let mut line = format!(
                    "  {}. {}",
                    row.position,
                    provider_label(catalog, row.provider)
                );
                if let Some(charter) = row.charter {
                    line.push_str(&format!(" + {}", capability_label(catalog, charter)));
                }
                write!(out, "{line}")?;
                if row.free {
                    write!(out, " {}", "(free)".dimmed())?;
                }
                if !row.visible {
                    write!(out, " {}", "(filtered out)".yellow())?;
                }
                writeln!(out)?;
            }
            if !stats.uncovered.is_empty() {
                writeln!(out)?;
                writeln!(
                    out,
                    "Uncovered: {}",
                    capability_list(catalog, &stats.uncovered).red()
                )?;
            }
            if !stats.requirements_met() {
                writeln!(
                    out,
                    "Missing prestige goods: {}",
                    capability_list(catalog, &stats.missing_prestige).red()
                )?;
            }
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct CharterMenu<'a> {
    provider: &'a str,
    options: Vec<CharterOption>,
}

#[derive(Debug, Serialize)]
struct GainsView<'a> {
    gains: Vec<ProviderGain>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    charter_menus: Vec<CharterMenu<'a>>,
}

/// Marginal gain per visible unselected provider, best first. With `verbose`,
/// also the charter menu of each selected provider.
pub fn write_gains<W: Write>(
    out: &mut W,
    format: ReportFormat,
    catalog: &Catalog,
    session: &SessionState,
    verbose: bool,
) -> Result<()> {
    let mut gains = session.gains(catalog);
    gains.sort_by(|a, b| b.gain.total().cmp(&a.gain.total()));
    let charter_menus: Vec<CharterMenu<'_>> = if verbose {
        session
            .selection()
            .providers()
            .iter()
            .map(|key| CharterMenu {
                provider: key,
                options: session.charter_options(catalog, key),
            })
            .filter(|menu| !menu.options.is_empty())
            .collect()
    } else {
        Vec::new()
    };
    let view = GainsView {
        gains,
        charter_menus,
    };

    match format {
        ReportFormat::Json => write_json(out, &view),
        ReportFormat::Markdown => {
            writeln!(out, "# Marginal Gains\n")?;
            writeln!(out, "| Provider | Base | Charter | Total | Free |")?;
            writeln!(out, "|----------|------|---------|-------|------|")?;
            for row in &view.gains {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} |",
                    provider_label(catalog, &row.provider),
                    row.gain.base,
                    row.gain
                        .best_charter
                        .as_deref()
                        .map_or_else(|| "-".to_string(), |c| capability_label(catalog, c)),
                    row.gain.total(),
                    if row.free { "yes" } else { "no" }
                )?;
            }
            for menu in &view.charter_menus {
                writeln!(out, "\n## Charters for {}\n", provider_label(catalog, menu.provider))?;
                for option in &menu.options {
                    let active = if option.active { " (active)" } else { "" };
                    writeln!(
                        out,
                        "- {}: +{}{active}",
                        capability_label(catalog, &option.charter),
                        option.new_coverage
                    )?;
                }
            }
            Ok(())
        }
        ReportFormat::Console => {
            writeln!(out, "{}", "📈 Marginal Gains".bright_cyan().bold())?;
            writeln!(out, "{}", "================".cyan())?;
            if view.gains.is_empty() {
                writeln!(out, "No unselected providers are visible.")?;
            }
            for row in &view.gains {
                let total = format!("+{}", row.gain.total());
                let total = if row.gain.total() == 0 {
                    total.dimmed()
                } else {
                    total.green().bold()
                };
                write!(
                    out,
                    "  {total:>4} {} (base {}",
                    provider_label(catalog, &row.provider),
                    row.gain.base
                )?;
                if let Some(charter) = &row.gain.best_charter {
                    write!(out, ", charter {}", capability_label(catalog, charter))?;
                }
                write!(out, ")")?;
                if row.free {
                    write!(out, " {}", "(free)".dimmed())?;
                }
                writeln!(out)?;
            }
            for menu in &view.charter_menus {
                writeln!(out)?;
                writeln!(out, "Charters for {}:", provider_label(catalog, menu.provider).bold())?;
                for option in &menu.options {
                    let marker = if option.active { "●" } else { "○" };
                    writeln!(
                        out,
                        "  {marker} {} +{}",
                        capability_label(catalog, &option.charter),
                        option.new_coverage
                    )?;
                }
            }
            Ok(())
        }
    }
}

/// Capabilities contributed more than once by the selection.
pub fn write_overlaps<W: Write>(
    out: &mut W,
    format: ReportFormat,
    catalog: &Catalog,
    overlaps: &[Overlap],
) -> Result<()> {
    let contributors = |overlap: &Overlap| {
        overlap
            .contributors
            .iter()
            .map(|c| {
                let kind = match c.kind {
                    ContributionKind::Base => "base",
                    ContributionKind::Charter => "charter",
                };
                format!("{} ({kind})", provider_label(catalog, &c.provider))
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    match format {
        ReportFormat::Json => write_json(out, overlaps),
        ReportFormat::Markdown => {
            writeln!(out, "# Overlaps\n")?;
            if overlaps.is_empty() {
                writeln!(out, "_No overlapping contributions._")?;
                return Ok(());
            }
            writeln!(out, "| Capability | Degree | Contributors |")?;
            writeln!(out, "|------------|--------|--------------|")?;
            for overlap in overlaps {
                writeln!(
                    out,
                    "| {} | {} | {} |",
                    capability_label(catalog, &overlap.capability),
                    overlap.degree(),
                    contributors(overlap)
                )?;
            }
            Ok(())
        }
        ReportFormat::Console => {
            writeln!(out, "{}", "🔁 Overlaps".bright_cyan().bold())?;
            writeln!(out, "{}", "==========".cyan())?;
            if overlaps.is_empty() {
                writeln!(out, "No overlapping contributions.")?;
            }
            for overlap in overlaps {
                writeln!(
                    out,
                    "  {} {}: {}",
                    capability_label(catalog, &overlap.capability).bold(),
                    format!("×{}", overlap.degree()).yellow(),
                    contributors(overlap)
                )?;
            }
            Ok(())
        }
    }
}

/// Providers matching a search query.
pub fn write_search<W: Write>(
    out: &mut W,
    format: ReportFormat,
    catalog: &Catalog,
    providers: &[&Provider],
) -> Result<()> {
    match format {
        ReportFormat::Json => write_json(out, providers),
        ReportFormat::Markdown => {
            writeln!(out, "# Providers\n")?;
            for provider in providers {
                let keys: Vec<String> = provider.base.iter().cloned().collect();
                writeln!(
                    out,
                    "- **{}** (`{}`): {}",
                    provider.name,
                    provider.key,
                    capability_list(catalog, &keys)
                )?;
            }
            Ok(())
        }
        ReportFormat::Console => {
            writeln!(out, "{}", "🔎 Providers".bright_cyan().bold())?;
            writeln!(out, "{}", "===========".cyan())?;
            if providers.is_empty() {
                writeln!(out, "No providers match.")?;
            }
            for provider in providers {
                let base: Vec<String> = provider.base.iter().cloned().collect();
                write!(out, "  {}", provider_label(catalog, &provider.key).bold())?;
                if let Some(group) = &provider.group {
                    write!(out, " {}", format!("<{group}>").dimmed())?;
                }
                if provider.free {
                    write!(out, " {}", "(free)".dimmed())?;
                }
                writeln!(out)?;
                writeln!(out, "      base: {}", capability_list(catalog, &base))?;
                if !provider.charters.is_empty() {
                    let charters: Vec<String> = provider.charters.iter().cloned().collect();
                    writeln!(out, "      charters: {}", capability_list(catalog, &charters))?;
                }
            }
            Ok(())
        }
    }
}

fn write_optimization_body<W: Write>(
    out: &mut W,
    format: ReportFormat,
    catalog: &Catalog,
    optimization: &Optimization,
) -> Result<()> {
    let markdown = format == ReportFormat::Markdown;
    let proposal = match optimization {
        Optimization::Proposed(proposal) => proposal,
        Optimization::Unchanged { reason, stats } => {
            if markdown {
                writeln!(out, "# Optimizer\n")?;
                writeln!(out, "_No proposal: {reason}._\n")?;
                writeln!(out, "- **Coverage:** {}/{}", stats.covered, stats.targets)?;
            } else {
                writeln!(out, "{}", "🧭 Optimizer".bright_cyan().bold())?;
                writeln!(out, "{}", "===========".cyan())?;
                writeln!(out, "ℹ️  No proposal: {reason}")?;
                writeln!(out, "Coverage: {}/{}", stats.covered, stats.targets)?;
            }
            if !stats.requirements_met() {
                let missing = capability_list(catalog, &stats.missing_prestige);
                if markdown {
                    writeln!(out, "- **Missing prestige goods:** {missing}")?;
                } else {
                    writeln!(out, "Missing prestige goods: {}", missing.red())?;
                }
            }
            return Ok(());
        }
    };

    if markdown {
        writeln!(out, "# Optimizer Proposal\n")?;
        writeln!(out, "| # | Provider | Charter | Free | Gained |")?;
        writeln!(out, "|---|----------|---------|------|--------|")?;
    } else {
        writeln!(out, "{}", "🧭 Optimizer Proposal".bright_cyan().bold())?;
        writeln!(out, "{}", "====================".cyan())?;
    }
    for (idx, pick) in proposal.picks.iter().enumerate() {
        let charter = pick.charter.as_deref().map(|c| capability_label(catalog, c));
        let gained = capability_list(catalog, &pick.gained);
        if markdown {
            writeln!(
                out,
                "| {} | {} | {} | {} | {gained} |",
                idx + 1,
                provider_label(catalog, &pick.provider),
                charter.as_deref().unwrap_or("-"),
                if pick.free { "yes" } else { "no" }
            )?;
            continue;
        }
        write!(out, "  {}. {}", idx + 1, provider_label(catalog, &pick.provider).bold())?;
        if let Some(charter) = charter {
            write!(out, " + {charter}")?;
        }
        if pick.free {
            write!(out, " {}", "(free)".dimmed())?;
        }
        if let Some(prestige) = pick.prestige.as_deref() {
            let label = format!("(prestige {})", capability_label(catalog, prestige));
            write!(out, " {}", label.magenta())?;
        }
        writeln!(
            out,
            " → {} ({gained})",
            format!("+{}", pick.gained.len()).green()
        )?;
    }

    let (before, after) = (&proposal.before, &proposal.after);
    if markdown {
        writeln!(
            out,
            "\n- **Coverage:** {} → {} of {}",
            before.covered, after.covered, after.targets
        )?;
        writeln!(
            out,
            "- **Slots:** {} of {} used",
            proposal.slots_used, proposal.slots_available
        )?;
    } else {
        writeln!(out)?;
        writeln!(
            out,
            "Coverage: {} → {} of {} ({:.1}%)",
            before.covered,
            after.covered.to_string().green(),
            after.targets,
            percent(after.covered, after.targets)
        )?;
        writeln!(
            out,
            "Slots: {} of {} used",
            proposal.slots_used, proposal.slots_available
        )?;
    }
    if !after.uncovered.is_empty() {
        let uncovered = capability_list(catalog, &after.uncovered);
        if markdown {
            writeln!(out, "- **Still uncovered:** {uncovered}")?;
        } else {
            writeln!(out, "Still uncovered: {}", uncovered.red())?;
        }
    }
    if !after.requirements_met() {
        let missing = capability_list(catalog, &after.missing_prestige);
        if markdown {
            writeln!(out, "- **Missing prestige goods:** {missing}")?;
        } else {
            writeln!(out, "Missing prestige goods: {}", missing.red())?;
        }
    }
    Ok(())
}

/// An optimizer result that was only proposed, not applied.
pub fn write_optimization<W: Write>(
    out: &mut W,
    format: ReportFormat,
    catalog: &Catalog,
    optimization: &Optimization,
) -> Result<()> {
    if format == ReportFormat::Json {
        return write_json(out, optimization);
    }
    write_optimization_body(out, format, catalog, optimization)
}

#[derive(Debug, Serialize)]
struct AppliedView<'a> {
    #[serde(flatten)]
    optimization: &'a Optimization,
    applied: usize,
}

/// An optimizer result together with how many picks were committed.
pub fn write_applied<W: Write>(
    out: &mut W,
    format: ReportFormat,
    catalog: &Catalog,
    optimization: &Optimization,
    applied: usize,
) -> Result<()> {
    match format {
        ReportFormat::Json => write_json(
            out,
            &AppliedView {
                optimization,
                applied,
            },
        ),
        ReportFormat::Markdown => {
            write_optimization_body(out, format, catalog, optimization)?;
            writeln!(out, "\n_Applied {applied} picks._")?;
            Ok(())
        }
        ReportFormat::Console => {
            write_optimization_body(out, format, catalog, optimization)?;
            writeln!(out)?;
            writeln!(out, "✅ Applied {applied} picks")?;
            Ok(())
        }
    }
}

/// Result of a state-changing action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action: &'static str,
    pub changed: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportReport>,
}

impl ActionOutcome {
    pub fn new(action: &'static str, changed: bool, detail: impl Into<String>) -> Self {
        Self {
            action,
            changed,
            detail: detail.into(),
            import: None,
        }
    }

    #[must_use]
    pub fn with_import(mut self, report: ImportReport) -> Self {
        self.import = Some(report);
        self
    }
}

pub fn write_outcome<W: Write>(
    out: &mut W,
    format: ReportFormat,
    outcome: &ActionOutcome,
) -> Result<()> {
    match format {
        ReportFormat::Json => write_json(out, outcome),
        ReportFormat::Markdown => {
            writeln!(out, "- **{}**: {}", outcome.action, outcome.detail)?;
            if let Some(report) = &outcome.import {
                writeln!(out, "- **import**: {report}")?;
            }
            Ok(())
        }
        ReportFormat::Console => {
            let marker = if outcome.changed { "✅" } else { "⚪" };
            writeln!(out, "{marker} {}", outcome.detail)?;
            if let Some(report) = &outcome.import {
                let summary = format!("{} of {} entries applied", report.applied, report.total);
                if report.is_complete() {
                    writeln!(out, "   {}", summary.green())?;
                } else {
                    writeln!(out, "   {}", summary.yellow())?;
                    for entry in &report.dropped {
                        writeln!(out, "   • dropped {}", entry.yellow())?;
                    }
                }
            }
            Ok(())
        }
    }
}
