//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use disk_charter::core::config::{BundlePolicy, Config, SizeAccounting};
use disk_charter::core::errors::{CharterError, Result};
use disk_charter::prelude::*;

/// disk_charter — concurrent per-directory disk-usage scanner.
#[derive(Debug, Parser)]
#[command(
    name = "dch",
    author,
    version,
    about = "disk charter - concurrent disk-usage scanner"
)]
pub struct Cli {
    /// Directory to scan.
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Emit the full tree as JSON instead of the text rendering.
    #[arg(long)]
    json: bool,
    /// Write output to a file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Materialize file-level nodes in the tree.
    #[arg(long)]
    include_files: bool,
    /// Maximum descent depth.
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,
    /// Worker thread count (0 derives from hardware parallelism).
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,
    /// Count apparent file sizes instead of allocated blocks.
    #[arg(long)]
    logical: bool,
    /// How opaque bundle directories are handled.
    #[arg(long, value_enum, value_name = "POLICY")]
    bundles: Option<BundleArg>,
    /// Descend across device boundaries (mounted volumes).
    #[arg(long)]
    cross_devices: bool,
    /// Depth of the rendered tree.
    #[arg(long, default_value_t = 2, value_name = "N")]
    render_depth: usize,
    /// Largest-N children shown per directory.
    #[arg(long, default_value_t = 10, value_name = "N")]
    top: usize,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BundleArg {
    /// Exclude bundles from totals (zero-size placeholder node).
    Skip,
    /// Fold each bundle's recursive total in as one opaque unit.
    Aggregate,
}

/// Parse config, run the scan, render the result.
pub fn run(args: &Cli) -> Result<()> {
    setup_logging(args);

    if args.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let mut config = Config::load(args.config.as_deref())?;
    apply_cli_overrides(&mut config, args);

    let report = ParallelScanner::new(config.scan)?.scan(&args.path)?;

    let mut snapshot = report.snapshot();
    snapshot.sort_by_size();

    if args.json {
        let json = snapshot.to_json()?;
        match &args.output {
            Some(path) => fs::write(path, json).map_err(|e| CharterError::io(path, e))?,
            None => println!("{json}"),
        }
        return Ok(());
    }

    let mut rendered = String::new();
    render_tree(&snapshot, 0, args.render_depth, args.top, &mut rendered);
    match &args.output {
        Some(path) => fs::write(path, &rendered).map_err(|e| CharterError::io(path, e))?,
        None => {
            print!("{rendered}");
            if !args.quiet {
                print_summary(&report.summary);
            }
        }
    }
    Ok(())
}

fn setup_logging(args: &Cli) {
    let filter = if args.verbose {
        EnvFilter::new("disk_charter=debug,warn")
    } else if args.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("disk_charter=info,warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_cli_overrides(config: &mut Config, args: &Cli) {
    if args.include_files {
        config.scan.include_file_nodes = true;
    }
    if let Some(depth) = args.max_depth {
        config.scan.max_depth = Some(depth);
    }
    if let Some(workers) = args.workers {
        config.scan.worker_count = workers;
    }
    if args.logical {
        config.scan.size_accounting = SizeAccounting::Logical;
    }
    if let Some(policy) = args.bundles {
        config.scan.bundle_policy = match policy {
            BundleArg::Skip => BundlePolicy::Skip,
            BundleArg::Aggregate => BundlePolicy::Aggregate,
        };
    }
    if args.cross_devices {
        config.scan.stay_on_device = false;
    }
}

/// Render the size-sorted tree, `top` largest children per directory,
/// down to `max_depth` levels below the root.
fn render_tree(node: &NodeSnapshot, depth: usize, max_depth: usize, top: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let size = human_bytes(node.size_bytes);
    let line = if depth == 0 {
        format!("{} {}\n", size.bold(), node.path.display())
    } else {
        format!("{indent}{} {}\n", size.bold(), node.name)
    };
    out.push_str(&line);

    if depth >= max_depth {
        return;
    }
    for child in node.children.iter().take(top) {
        render_tree(child, depth + 1, max_depth, top, out);
    }
    let hidden = node.children.len().saturating_sub(top);
    if hidden > 0 {
        out.push_str(&format!(
            "{}  {}\n",
            indent,
            format!("... {hidden} more").dimmed()
        ));
    }
}

fn print_summary(summary: &ScanSummary) {
    let status = if summary.completed {
        "complete".green()
    } else {
        "cancelled".yellow()
    };
    println!(
        "\n{} {} in {} dirs, {} files, {} skipped, {} hardlink dups — {} ({} ms)",
        "total".bold(),
        human_bytes(summary.total_bytes).bold(),
        summary.dirs_scanned,
        summary.files_seen,
        summary.entries_skipped,
        summary.hardlinks_skipped,
        status,
        summary.duration_ms
    );
}

/// Format a byte count with binary units, one decimal place.
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
