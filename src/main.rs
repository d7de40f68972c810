use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use depwatch::{
    config::Config,
    manifest::ManifestLocator,
    model::{CheckKind, CheckResult, Ecosystem, Severity},
    output::{
        format_report_to_string, print_manifests, print_report, CheckReport, OutputFormat,
        TerminalAnnotations, TerminalList,
    },
    platform::Toolchain,
    runner::ShellRunner,
    StatusEngine,
};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "depwatch")]
#[command(
    author,
    version,
    about = "Check project dependencies for outdated and vulnerable packages"
)]
struct Cli {
    /// Log debug output to stderr (overridden by DEPWATCH_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run outdated and vulnerability checks
    Check {
        /// Project root to search for manifests
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Only check these ecosystems (python, go, npm, composer, cargo)
        #[arg(short, long, value_parser = Ecosystem::from_str)]
        ecosystem: Vec<Ecosystem>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Skip vulnerability checking
        #[arg(long)]
        no_vuln_check: bool,

        /// Skip outdated version checking
        #[arg(long)]
        no_outdated_check: bool,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit with error if vulnerabilities at or above this severity are found
        #[arg(long, value_enum)]
        fail_on: Option<FailLevel>,

        /// Run checks one after another
        #[arg(long)]
        no_parallel: bool,
    },

    /// List the manifests found under a project root
    Manifests {
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },

    /// Check one manifest and print it with inline annotations
    Annotate {
        /// Path to a requirements.txt, go.mod, package.json, composer.json or Cargo.toml
        file: PathBuf,

        /// Skip vulnerability checking
        #[arg(long)]
        no_vuln_check: bool,
    },

    /// Check, then show one kind of finding as a numbered list
    List {
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        #[arg(short, long, value_enum, default_value = "outdated")]
        kind: ListKind,

        /// Only check these ecosystems
        #[arg(short, long, value_parser = Ecosystem::from_str)]
        ecosystem: Vec<Ecosystem>,

        /// Select entry N (1-based) and print what it resolves to
        #[arg(long)]
        pick: Option<usize>,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn threshold(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Outdated,
    Vulnerabilities,
}

impl From<ListKind> for CheckKind {
    fn from(kind: ListKind) -> Self {
        match kind {
            ListKind::Outdated => CheckKind::Outdated,
            ListKind::Vulnerabilities => CheckKind::Vulnerabilities,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "depwatch=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("DEPWATCH_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable config");
        Config::default()
    });

    match cli.command {
        Commands::Check {
            root,
            ecosystem,
            format,
            no_vuln_check,
            no_outdated_check,
            output,
            fail_on,
            no_parallel,
        } => {
            let format_str = format.unwrap_or(config.default_format.clone());
            let kinds = requested_kinds(
                !no_outdated_check && config.check_outdated,
                !no_vuln_check && !config.skip_vuln_check,
            );

            run_check(
                &config,
                &root,
                ecosystem,
                &kinds,
                &format_str,
                output,
                fail_on,
                !no_parallel,
            )
            .await
        }
        Commands::Manifests { root } => {
            let engine = build_engine(&config, &root);
            print_manifests(&engine.manifests());
            Ok(exit_codes::SUCCESS)
        }
        Commands::Annotate {
            file,
            no_vuln_check,
        } => {
            run_annotate(&config, &file, no_vuln_check).await?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::List {
            root,
            kind,
            ecosystem,
            pick,
        } => {
            run_list(&config, &root, ecosystem, kind.into(), pick).await?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn build_engine(config: &Config, root: &Path) -> StatusEngine {
    let locator = ManifestLocator::new(root).with_max_depth(config.discovery_depth);
    StatusEngine::new(locator, Arc::new(ShellRunner), Arc::new(Toolchain::system()))
        .with_ignore(config.ignore.clone())
}

fn requested_kinds(outdated: bool, vulnerabilities: bool) -> Vec<CheckKind> {
    CheckKind::ALL
        .into_iter()
        .filter(|kind| match kind {
            CheckKind::Outdated => outdated,
            CheckKind::Vulnerabilities => vulnerabilities,
        })
        .collect()
}

/// Explicitly named ecosystems are always checked, so a missing manifest is
/// reported. Otherwise only configured ecosystems with a manifest are.
fn selected_ecosystems(engine: &StatusEngine, config: &Config, named: Vec<Ecosystem>) -> Vec<Ecosystem> {
    if !named.is_empty() {
        return named;
    }

    engine
        .present_ecosystems()
        .into_iter()
        .filter(|e| config.ecosystems.contains(e))
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn run_check(
    config: &Config,
    root: &Path,
    named: Vec<Ecosystem>,
    kinds: &[CheckKind],
    format: &str,
    output_file: Option<PathBuf>,
    fail_on: Option<FailLevel>,
    parallel: bool,
) -> Result<u8> {
    let format = OutputFormat::from_str(format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && output_file.is_none();

    let engine = build_engine(config, root);
    let ecosystems = selected_ecosystems(&engine, config, named);
    let requests: Vec<(Ecosystem, CheckKind)> = ecosystems
        .iter()
        .flat_map(|&e| kinds.iter().map(move |&k| (e, k)))
        .collect();

    let results = if parallel && requests.len() > 1 {
        check_concurrent(&engine, &requests, is_interactive).await
    } else {
        check_sequential(&engine, &requests, is_interactive).await
    };

    let report = CheckReport::new(&results, engine.query_status());

    // Handle output
    if let Some(path) = output_file {
        let content = format_report_to_string(&report, format)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Results written to: {}", path.display());
    } else {
        print_report(&report, format)?;
    }

    Ok(determine_exit_code(report.status.max_severity(), fail_on))
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Run all checks concurrently
async fn check_concurrent(
    engine: &StatusEngine,
    requests: &[(Ecosystem, CheckKind)],
    is_interactive: bool,
) -> Vec<CheckResult> {
    let progress = if is_interactive {
        let pb = ProgressBar::new(requests.len() as u64);
        pb.set_style(spinner_style("{spinner:.green} [{pos}/{len}] Running checks..."));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(Arc::new(pb))
    } else {
        None
    };

    let futures: Vec<_> = requests
        .iter()
        .map(|&(ecosystem, kind)| {
            let pb = progress.clone();
            async move {
                let result = engine.check(ecosystem, kind).await;
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                result
            }
        })
        .collect();

    let results = join_all(futures).await;

    if let Some(pb) = progress {
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        pb.finish_with_message(format!("{} checks, {} could not run", results.len(), failed));
    }

    results
}

/// Run checks one after another
async fn check_sequential(
    engine: &StatusEngine,
    requests: &[(Ecosystem, CheckKind)],
    is_interactive: bool,
) -> Vec<CheckResult> {
    let progress = if is_interactive {
        let pb = ProgressBar::new(requests.len() as u64);
        pb.set_style(spinner_style("{spinner:.green} [{pos}/{len}] {msg}"));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let mut results = Vec::with_capacity(requests.len());
    for &(ecosystem, kind) in requests {
        if let Some(ref pb) = progress {
            pb.set_message(format!("Checking {} {}...", ecosystem, kind));
        }

        results.push(engine.check(ecosystem, kind).await);

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!("{} checks done", results.len()));
    }

    results
}

async fn run_annotate(config: &Config, file: &Path, no_vuln_check: bool) -> Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("manifest path has no file name")?;
    let ecosystem = Ecosystem::for_manifest(file_name)
        .with_context(|| format!("{} is not a supported manifest", file_name))?;
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    // Only the named file counts; nothing is walked.
    let dir = file.parent().unwrap_or(Path::new("."));
    let locator = ManifestLocator::new(dir).with_max_depth(0);
    let engine = StatusEngine::new(locator, Arc::new(ShellRunner), Arc::new(Toolchain::system()))
        .with_ignore(config.ignore.clone());
    let container = engine.track_file(&file);

    let kinds = requested_kinds(true, !no_vuln_check);
    let requests: Vec<_> = kinds.iter().map(|&k| (ecosystem, k)).collect();
    for result in engine.check_all(&requests).await {
        eprintln!("{}", result.summary());
    }

    let entry = engine
        .manifest(container)
        .with_context(|| format!("{} is no longer readable", file.display()))?;
    let mut sink = TerminalAnnotations::new(&text);
    engine.presenter().annotate_manifest(&entry, &text, &mut sink);
    print!("{}", sink.render());

    Ok(())
}

async fn run_list(
    config: &Config,
    root: &Path,
    named: Vec<Ecosystem>,
    kind: CheckKind,
    pick: Option<usize>,
) -> Result<()> {
    let engine = build_engine(config, root);
    let ecosystems = selected_ecosystems(&engine, config, named);
    let requests: Vec<_> = ecosystems.iter().map(|&e| (e, kind)).collect();

    for result in engine.check_all(&requests).await {
        if !result.is_ok() {
            eprintln!("{}", result.summary());
        }
    }

    let mut sink = TerminalList::new(pick);
    engine.presenter().show_list(&mut sink, kind, |entry| {
        println!();
        println!("Selected: {} package {}", entry.ecosystem, entry.package);
    });

    Ok(())
}

/// Determine the exit code based on the worst severity found and --fail-on
fn determine_exit_code(worst: Option<Severity>, fail_on: Option<FailLevel>) -> u8 {
    let (Some(fail_on), Some(worst)) = (fail_on, worst) else {
        return exit_codes::SUCCESS;
    };

    if worst < fail_on.threshold() {
        return exit_codes::SUCCESS;
    }

    match worst {
        Severity::Critical => exit_codes::CRITICAL_VULN,
        Severity::High => exit_codes::HIGH_VULN,
        Severity::Medium => exit_codes::MEDIUM_VULN,
        Severity::Low => exit_codes::LOW_VULN,
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'depwatch config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
