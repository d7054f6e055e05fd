use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pathfinder_core::{
    render_markdown_summary, write_report, CompareConfig, CompareMethod, Direction, EntryNode,
    ScanEvent, ScanSession, ScanState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pathfinder",
    version,
    about = "Compare two folder trees and copy changes across."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compare two folders and print what differs.
    Compare(CompareArgs),
    /// Copy one side of a single differing entry over the other.
    Resolve(ResolveArgs),
    /// Print the effective configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliCompareMethod {
    Shallow,
    Metadata,
    Content,
}

impl From<CliCompareMethod> for CompareMethod {
    fn from(value: CliCompareMethod) -> Self {
        match value {
            CliCompareMethod::Shallow => CompareMethod::Shallow,
            CliCompareMethod::Metadata => CompareMethod::Metadata,
            CliCompareMethod::Content => CompareMethod::Content,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Keep {
    Left,
    Right,
}

impl From<Keep> for Direction {
    fn from(value: Keep) -> Self {
        match value {
            Keep::Left => Direction::KeepLeft,
            Keep::Right => Direction::KeepRight,
        }
    }
}

#[derive(Debug, Args)]
struct RootArgs {
    /// Left folder, usually the working copy. Falls back to the configured root.
    #[arg(long, value_name = "DIR")]
    left: Option<PathBuf>,

    /// Right folder (the backup). Falls back to the configured root.
    #[arg(long, value_name = "DIR")]
    right: Option<PathBuf>,

    /// Configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File comparison method.
    #[arg(long)]
    method: Option<CliCompareMethod>,

    /// Names or globs to skip on both sides (repeatable, replaces the defaults).
    #[arg(long = "ignore", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    ignore: Vec<String>,
}

#[derive(Debug, Args)]
struct CompareArgs {
    #[command(flatten)]
    roots: RootArgs,

    /// Also list unchanged files.
    #[arg(long)]
    all: bool,

    /// Print the folder being scanned while the comparison runs.
    #[arg(long)]
    progress: bool,

    /// Optional JSON report output file.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    #[command(flatten)]
    roots: RootArgs,

    /// Entry to resolve, relative to both roots.
    #[arg(long, value_name = "PATH")]
    path: PathBuf,

    /// Which side's version wins.
    #[arg(long)]
    keep: Keep,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Configuration file.
    #[arg(long, value_name = "FILE", default_value = "pathfinder.json")]
    config: PathBuf,

    /// Write the effective configuration back to the file.
    #[arg(long)]
    write: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Compare(args) => run_compare_command(args),
        Commands::Resolve(args) => run_resolve_command(args),
        Commands::Config(args) => run_config_command(args),
    }
}

fn run_compare_command(args: CompareArgs) -> Result<()> {
    let mut config = effective_config(&args.roots)?;
    config.include_unchanged = args.all;

    let session = ScanSession::new(config);
    run_session(&session, args.progress)?;

    let snapshot = session.tree_snapshot();
    if snapshot.is_empty() {
        println!("No changes");
    } else {
        print!("{}", render_tree(&snapshot));
    }

    let counts = session.counts();
    println!(
        "{} changed, {} not backed up, {} only in backup, {} unknown.",
        counts.changed, counts.left_only, counts.right_only, counts.unknown
    );
    for warning in session.warnings() {
        println!("Warning: {}", warning);
    }

    if args.json.is_some() || args.md.is_some() {
        let report = session
            .report()
            .ok_or_else(|| anyhow!("comparison did not finish"))?;
        if let Some(path) = &args.json {
            write_report(&report, path)?;
            println!("Report written to {}", path.display());
        }
        if let Some(path) = &args.md {
            let markdown = render_markdown_summary(&report);
            fs::write(path, markdown).with_context(|| {
                format!("failed to write markdown summary to {}", path.display())
            })?;
            println!("Markdown summary written to {}", path.display());
        }
    }

    Ok(())
}

fn run_resolve_command(args: ResolveArgs) -> Result<()> {
    let config = effective_config(&args.roots)?;
    let session = ScanSession::new(config);
    run_session(&session, false)?;

    let id = session
        .find_by_relative_path(&args.path)
        .ok_or_else(|| anyhow!("{} has no pending change", args.path.display()))?;
    let prompt = session
        .prompt(id)
        .ok_or_else(|| anyhow!("{} vanished from the result", args.path.display()))?;
    let direction = Direction::from(args.keep);

    println!("{}", prompt.message);
    for choice in prompt.choices.iter().filter(|choice| choice.direction.is_some()) {
        let marker = if choice.direction == Some(direction) { "*" } else { " " };
        println!(" {} {}", marker, choice.label);
    }

    session
        .resolve(id, direction)
        .with_context(|| format!("failed to resolve {}", args.path.display()))?;
    println!("Resolved {}", args.path.display());
    Ok(())
}

fn run_config_command(args: ConfigArgs) -> Result<()> {
    let config = CompareConfig::load(&args.config)?;
    let payload = serde_json::to_string_pretty(&config).context("failed to serialize config")?;
    println!("{}", payload);

    if args.write {
        config.save(&args.config)?;
        println!("Configuration written to {}", args.config.display());
    }
    Ok(())
}

fn effective_config(args: &RootArgs) -> Result<CompareConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            CompareConfig::load(path)?
        }
        None => CompareConfig::default(),
    };
    if let Some(left) = &args.left {
        config.left_root = Some(left.clone());
    }
    if let Some(right) = &args.right {
        config.right_root = Some(right.clone());
    }
    if let Some(method) = args.method {
        config.compare_method = method.into();
    }
    if !args.ignore.is_empty() {
        config.ignore = args.ignore.clone();
    }
    if config.roots().is_none() {
        bail!("both --left and --right are required unless set in the configuration");
    }
    Ok(config)
}

/// Starts the session's scan and blocks until it ends.
fn run_session(session: &ScanSession, progress: bool) -> Result<()> {
    let messages = session.subscribe();
    session.start().context("failed to start comparison")?;

    for message in messages.iter() {
        match message.event {
            ScanEvent::Progress { path } if progress => {
                eprintln!("Scanning {}", path.display());
            }
            ScanEvent::Finished { .. } | ScanEvent::Invalid { .. } | ScanEvent::Cancelled => break,
            _ => {}
        }
    }

    match session.wait() {
        ScanState::Finished { .. } => Ok(()),
        ScanState::Invalid => Err(anyhow!(
            "invalid comparison: {}",
            session.last_error().unwrap_or_default()
        )),
        state => Err(anyhow!("comparison ended in state {:?}", state)),
    }
}

fn render_tree(nodes: &[EntryNode]) -> String {
    let mut out = String::new();
    render_level(nodes, 0, &mut out);
    out
}

fn render_level(nodes: &[EntryNode], depth: usize, out: &mut String) {
    for node in nodes {
        let entry = &node.entry;
        let name = if entry.is_dir {
            format!("{}{}", entry.name, std::path::MAIN_SEPARATOR)
        } else {
            entry.name.clone()
        };
        let label = entry.change.presentation().label;
        out.push_str(&"  ".repeat(depth));
        out.push_str(&name);
        if !label.is_empty() {
            out.push_str(&format!("  [{label}]"));
        }
        if let Some(error) = &entry.error {
            out.push_str(&format!("  ({error})"));
        }
        out.push('\n');

        if let Some(children) = &node.children {
            render_level(children, depth + 1, out);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::{effective_config, render_tree, RootArgs};
    use pathfinder_core::{CompareConfig, CompareMethod, ScanSession};

    #[test]
    fn flags_override_configured_roots() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("pathfinder.json");
        let mut stored = CompareConfig::with_roots("/stored/left", "/stored/right");
        stored.compare_method = CompareMethod::Content;
        stored.save(&path).expect("save");

        let config = effective_config(&RootArgs {
            left: Some("/flag/left".into()),
            right: None,
            config: Some(path),
            method: None,
            ignore: vec!["*.tmp".to_string()],
        })
        .expect("config");
        assert_eq!(config.left_root.as_deref(), Some(Path::new("/flag/left")));
        assert_eq!(config.right_root.as_deref(), Some(Path::new("/stored/right")));
        assert_eq!(config.compare_method, CompareMethod::Content);
        assert_eq!(config.ignore, vec!["*.tmp".to_string()]);

        assert!(effective_config(&RootArgs {
            left: None,
            right: None,
            config: None,
            method: None,
            ignore: Vec::new(),
        })
        .is_err());
    }

    #[test]
    fn tree_lists_labels_with_indentation() {
        let temp = TempDir::new().expect("tempdir");
        let left = temp.path().join("left");
        let right = temp.path().join("right");
        fs::create_dir_all(left.join("docs")).expect("dir");
        fs::create_dir_all(right.join("docs")).expect("dir");
        fs::write(left.join("docs/a.md"), "one").expect("write");
        fs::write(right.join("docs/a.md"), "two!").expect("write");

        let session = ScanSession::new(CompareConfig::with_roots(&left, &right));
        session.start().expect("start");
        session.wait();

        let rendered = render_tree(&session.tree_snapshot());
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(rendered, format!("docs{sep}\n  a.md  [Changed]\n"));
    }
}
