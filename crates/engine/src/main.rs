use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use context_engine::{ContextEngine, ContextQuery, EngineConfig};
use context_indexer::FsWorkspace;
use context_search::Intent;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STORAGE_DIR_NAME: &str = ".context-engine";

#[derive(Parser)]
#[command(name = "context-engine")]
#[command(about = "Token-budgeted code context for AI assistants", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the index up to date with the workspace
    Index,

    /// Retrieve context for a request
    Query(QueryArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// Free-text request
    text: String,

    /// Maximum tokens across returned chunks
    #[arg(long, short = 'b', default_value_t = 4000)]
    budget: usize,

    /// Skip classification: explain, bug_fix, refactor, generate, test
    #[arg(long)]
    intent: Option<Intent>,

    /// File open in the editor, relative to the root
    #[arg(long)]
    active_file: Option<String>,

    /// Selected text to add to the request
    #[arg(long)]
    selection: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Workspace root {} not found", cli.root.display()))?;
    let config = load_config(cli.config.as_deref(), &root)?;
    let workspace = Arc::new(FsWorkspace::new(&root));
    let engine = ContextEngine::new(config, workspace.clone())
        .context("Failed to configure context engine")?;
    engine
        .initialize()
        .await
        .context("Failed to initialize context engine")?;

    let outcome = run(&engine, &workspace, cli.command, cli.pretty).await;
    engine.dispose().await?;
    outcome
}

async fn run(
    engine: &ContextEngine,
    workspace: &FsWorkspace,
    command: Commands,
    pretty: bool,
) -> Result<()> {
    match command {
        Commands::Index => {
            let stats = engine.index_workspace().await?;
            print_json(&stats, pretty)
        }
        Commands::Query(args) => {
            engine.index_workspace().await?;
            let mut query = ContextQuery::new(args.text, args.budget);
            query.intent = args.intent;
            query.selection = args.selection;
            query.active_file = args.active_file.map(|path| {
                if Path::new(&path).is_absolute() {
                    path
                } else {
                    workspace.resolve(&path)
                }
            });
            let result = engine.query(query).await?;
            print_json(&result, pretty)
        }
    }
}

/// File config, then `CONTEXT_ENGINE_*` overrides, then CLI defaults for
/// anything a one-shot run needs.
fn load_config(path: Option<&Path>, root: &Path) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(path).context("Failed to load config")?;
    if config.storage_dir.is_none() {
        config.storage_dir = Some(root.join(STORAGE_DIR_NAME));
    }
    // Each command runs its own pass.
    config.index_on_startup = false;
    let storage_pattern = format!("{STORAGE_DIR_NAME}/**");
    if !config.watcher.ignore_patterns.contains(&storage_pattern) {
        config.watcher.ignore_patterns.push(storage_pattern);
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}
