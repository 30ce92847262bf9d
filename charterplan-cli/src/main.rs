mod reports;
mod storage;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;

use charterplan_core::{
    Catalog, CharterChange, CharterRejection, Confirm, DEFAULT_BUDGET, OpenedSession, Planner,
    SessionState,
};
use reports::{ActionOutcome, ReportFormat};
use storage::{FileCatalogLoader, FileSessionStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Coverage summary and the current selection
    Status,
    /// Marginal gain of every visible unselected provider
    Gains,
    /// Capabilities contributed more than once
    Overlaps,
    /// Search providers by key, name, group, or capability
    Search,
    /// Propose picks for the remaining budget without applying them
    Optimize,
    /// Propose picks and commit them to the session
    Apply,
    /// Add --provider to the selection
    Select,
    /// Remove --provider (and its charter) from the selection
    Deselect,
    /// Choose --charter for --provider; repeating it turns it off
    Charter,
    /// Move the provider at --from to --to
    Reorder,
    /// Empty the selection (requires --yes)
    Clear,
    /// Flip --capability in the target set
    ToggleCapability,
    /// Flip --provider in the enabled-provider set
    ToggleProvider,
    /// Flip the priority mark on --capability
    TogglePriority,
    /// Flip the requirement on the prestige good for --capability
    TogglePrestige,
    /// Enable every capability and provider, drop priorities
    ResetFilter,
    /// Print a share code for the selection
    Share,
    /// Replace the selection from --code
    ImportCode,
    /// Write the session as JSON
    Export,
    /// Replace the session from the JSON file at --input
    Import,
}

impl Action {
    const fn mutates(self) -> bool {
        matches!(
            self,
            Self::Apply
                | Self::Select
                | Self::Deselect
                | Self::Charter
                | Self::Reorder
                | Self::Clear
                | Self::ToggleCapability
                | Self::ToggleProvider
                | Self::TogglePriority
                | Self::TogglePrestige
                | Self::ResetFilter
                | Self::ImportCode
                | Self::Import
        )
    }
}

#[derive(Debug, Parser)]
#[command(name = "charterplan", version)]
#[command(about = "Plan provider selections that cover the most capabilities within a budget")]
struct Args {
    /// Catalog JSON file
    #[arg(long)]
    catalog: PathBuf,

    /// Directory holding saved sessions
    #[arg(long, default_value = ".charterplan")]
    state_dir: PathBuf,

    /// Session name (saved as <state-dir>/<session>.json)
    #[arg(long, default_value = "default")]
    session: String,

    /// Action to run
    #[arg(long, value_enum, default_value_t = Action::Status)]
    action: Action,

    /// Provider key for select, deselect, charter, and toggle-provider
    #[arg(long)]
    provider: Option<String>,

    /// Charter capability key for the charter action
    #[arg(long)]
    charter: Option<String>,

    /// Capability key for toggle-capability, toggle-priority and toggle-prestige
    #[arg(long)]
    capability: Option<String>,

    /// Source position (zero-based) for reorder
    #[arg(long)]
    from: Option<usize>,

    /// Target position (zero-based) for reorder
    #[arg(long)]
    to: Option<usize>,

    /// Share code for import-code
    #[arg(long)]
    code: Option<String>,

    /// Session JSON file for import
    #[arg(long)]
    input: Option<PathBuf>,

    /// Search text
    #[arg(long, default_value = "")]
    query: String,

    /// Confirm destructive actions
    #[arg(long)]
    yes: bool,

    /// Maximum number of non-free providers in the selection
    #[arg(long, default_value_t = DEFAULT_BUDGET)]
    budget: usize,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let planner = Planner::new(
        FileCatalogLoader::new(args.catalog.clone()),
        FileSessionStorage::new(args.state_dir.clone()),
    );
    let OpenedSession {
        catalog,
        mut session,
        report,
    } = planner
        .open(&args.session)
        .with_context(|| format!("failed to open session {}", args.session))?;
    if let Some(report) = report.filter(|report| !report.is_complete()) {
        eprintln!("⚠️  Saved session did not fully match the catalog: {report}");
    }

    let mut output_target = OutputTarget::new(args.output.clone())?;
    run_action(&args, &catalog, &mut session, &mut output_target)?;
    output_target.flush_inner()?;

    if args.action.mutates() {
        planner
            .save_session(&args.session, &session)
            .with_context(|| format!("failed to save session {}", args.session))?;
    }
    Ok(())
}

fn run_action(
    args: &Args,
    catalog: &Catalog,
    session: &mut SessionState,
    out: &mut OutputTarget,
) -> Result<()> {
    let format = args.report;
    match args.action {
        Action::Status => reports::write_status(out, format, catalog, session, args.budget),
        Action::Gains => reports::write_gains(out, format, catalog, session, args.verbose),
        Action::Overlaps => {
            reports::write_overlaps(out, format, catalog, &session.overlaps(catalog))
        }
        Action::Search => reports::write_search(out, format, catalog, &catalog.search(&args.query)),
        Action::Optimize => {
            let optimization = session.optimize(catalog, args.budget);
            reports::write_optimization(out, format, catalog, &optimization)
        }
        Action::Apply => {
            let optimization = session.optimize(catalog, args.budget);
            let applied = optimization
                .proposal()
                .map_or(0, |proposal| session.apply_proposal(catalog, proposal));
            reports::write_applied(out, format, catalog, &optimization, applied)
        }
        Action::Share => {
            let code = session.share_code(catalog);
            if format == ReportFormat::Console {
                writeln!(out, "{code}")?;
                return Ok(());
            }
            reports::write_outcome(out, format, &ActionOutcome::new("share", false, code))
        }
        Action::Export => {
            let json = session.export_json().context("failed to serialize session")?;
            writeln!(out, "{json}")?;
            Ok(())
        }
        _ => {
            let outcome = mutate(args, catalog, session)?;
            reports::write_outcome(out, format, &outcome)
        }
    }
}

fn action_name(action: Action) -> String {
    action
        .to_possible_value()
        .map_or_else(|| format!("{action:?}"), |value| value.get_name().to_string())
}

fn required<'a, T: ?Sized>(value: Option<&'a T>, flag: &str, action: Action) -> Result<&'a T> {
    match value {
        Some(value) => Ok(value),
        None => bail!("{flag} is required for --action {}", action_name(action)),
    }
}

fn mutate(args: &Args, catalog: &Catalog, session: &mut SessionState) -> Result<ActionOutcome> {
    let provider = || required(args.provider.as_deref(), "--provider", args.action);
    let capability = || required(args.capability.as_deref(), "--capability", args.action);
    let outcome = match args.action {
        Action::Select => {
            let provider = provider()?;
            let changed = session.select(catalog, provider);
            let detail = if changed {
                format!("selected {provider}")
            } else if catalog.contains_provider(provider) {
                format!("{provider} is already selected")
            } else {
                format!("unknown provider {provider} ignored")
            };
            ActionOutcome::new("select", changed, detail)
        }
        Action::Deselect => {
            let provider = provider()?;
            let changed = session.deselect(provider);
            let detail = if changed {
                format!("deselected {provider}")
            } else {
                format!("{provider} was not selected")
            };
            ActionOutcome::new("deselect", changed, detail)
        }
        Action::Charter => {
            let provider = provider()?;
            let charter = required(args.charter.as_deref(), "--charter", args.action)?;
            let change = session.choose_charter(catalog, provider, charter);
            describe_charter_change(provider, charter, &change)
        }
        Action::Reorder => {
            let from = *required(args.from.as_ref(), "--from", args.action)?;
            let to = *required(args.to.as_ref(), "--to", args.action)?;
            let changed = session.reorder(from, to) && from != to;
            let detail = if session.selection().len() > from.max(to) {
                format!("moved position {from} to {to}")
            } else {
                format!("positions {from}/{to} are out of range")
            };
            ActionOutcome::new("reorder", changed, detail)
        }
        Action::Clear => {
            let confirm = if args.yes { Confirm::Yes } else { Confirm::No };
            let removed = session.clear(confirm);
            let detail = if args.yes {
                format!("cleared {removed} providers")
            } else {
                "clear needs --yes; selection kept".to_string()
            };
            ActionOutcome::new("clear", removed > 0, detail)
        }
        Action::ToggleCapability => {
            let capability = capability()?;
            let before = session.filter().is_target(capability);
            let enabled = session.filter_mut().toggle_capability(catalog, capability);
            let state = if enabled { "enabled" } else { "disabled" };
            ActionOutcome::new(
                "toggle-capability",
                before != enabled,
                format!("capability {capability} {state}"),
            )
        }
        Action::ToggleProvider => {
            let provider = provider()?;
            let before = session.filter().is_provider_enabled(provider);
            let enabled = session.filter_mut().toggle_provider(catalog, provider);
            let state = if enabled { "enabled" } else { "disabled" };
            ActionOutcome::new(
                "toggle-provider",
                before != enabled,
                format!("provider {provider} {state}"),
            )
        }
        Action::TogglePriority => {
            let capability = capability()?;
            let before = session.filter().is_priority(capability);
            let marked = session.filter_mut().toggle_priority(capability);
            let detail = match (before, marked) {
                (_, true) => format!("{capability} marked as priority"),
                (true, false) => format!("{capability} is no longer a priority"),
                (false, false) => format!("{capability} is not an enabled target"),
            };
            ActionOutcome::new("toggle-priority", before != marked, detail)
        }
        Action::TogglePrestige => {
            let capability = capability()?;
            let before = session.filter().required_prestige().contains(capability);
            let required = session.filter_mut().toggle_prestige(catalog, capability);
            let detail = match (before, required) {
                (_, true) => format!("prestige good on {capability} required"),
                (true, false) => format!("prestige good on {capability} no longer required"),
                (false, false) => format!("no provider offers a prestige good on {capability}"),
            };
            ActionOutcome::new("toggle-prestige", before != required, detail)
        }
        Action::ResetFilter => {
            session.filter_mut().reset(catalog);
            ActionOutcome::new("reset-filter", true, "filters reset")
        }
        Action::ImportCode => {
            let code = required(args.code.as_deref(), "--code", args.action)?;
            let report = session
                .import_share_code(catalog, code)
                .context("invalid share code")?;
            ActionOutcome::new("import-code", true, "selection replaced from share code")
                .with_import(report)
        }
        Action::Import => {
            let path = required(args.input.as_deref(), "--input", args.action)?;
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let report = session
                .import_json(catalog, &json)
                .with_context(|| format!("failed to import {}", path.display()))?;
            ActionOutcome::new("import", true, format!("imported {}", path.display()))
                .with_import(report)
        }
        Action::Status
        | Action::Gains
        | Action::Overlaps
        | Action::Search
        | Action::Optimize
        | Action::Apply
        | Action::Share
        | Action::Export => bail!("{} does not change the session", action_name(args.action)),
    };
    Ok(outcome)
}

fn describe_charter_change(provider: &str, charter: &str, change: &CharterChange) -> ActionOutcome {
    let (changed, detail) = match change {
        CharterChange::Chosen => (true, format!("{provider} now holds charter {charter}")),
        CharterChange::Replaced { previous } => (
            true,
            format!("{provider} switched charter from {previous} to {charter}"),
        ),
        CharterChange::Cleared => (true, format!("{provider} dropped charter {charter}")),
        CharterChange::Ignored(CharterRejection::UnknownProvider) => {
            (false, format!("unknown provider {provider} ignored"))
        }
        CharterChange::Ignored(CharterRejection::NotSelected) => {
            (false, format!("{provider} must be selected before choosing a charter"))
        }
        CharterChange::Ignored(CharterRejection::NotOffered) => {
            (false, format!("{provider} does not offer charter {charter}"))
        }
    };
    ActionOutcome::new("charter", changed, detail)
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
