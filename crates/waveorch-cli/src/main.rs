//! Wave-Orch CLI - local multi-agent task orchestration
//!
//! Usage:
//!   wave-orch init                     Write the default config
//!   wave-orch status                   Show pause state and available agents
//!   wave-orch pause | resume           Toggle acceptance of new tasks
//!   wave-orch agents                   List the agent catalog
//!   wave-orch report <file|->          Validate a report block from agent output
//!   wave-orch diagnostic               Inspect agent and project configuration
//!   wave-orch cleanup [--days N]       Remove old event log directories

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use waveorch_core::{redact_any, OrchConfig};
use waveorch_orchestrator::{
    validate_report_strict, AgentRegistry, ConfigInspector, FilePauseFlag, Logger,
    PauseFlagStore, ReportParser,
};

#[derive(Parser)]
#[command(name = "wave-orch")]
#[command(author, version, about = "Local multi-agent task orchestration")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Base directory for state and logs (defaults to ~/.wave-orch)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config.toml into the base directory
    Init,

    /// Show pause state and available agents as JSON
    Status,

    /// Stop accepting new tasks
    Pause,

    /// Accept new tasks again
    Resume,

    /// List known agents and whether they are installed
    Agents,

    /// Extract, validate and print the report block from agent output
    Report {
        /// File holding the agent output, or `-` for stdin
        input: PathBuf,
    },

    /// Inspect agent configuration and optionally a project
    Diagnostic {
        /// Project directory to include
        #[arg(long)]
        project: Option<PathBuf>,

        /// Save the snapshot here instead of printing it
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Remove event log directories past the retention window
    Cleanup {
        /// Retention in days (defaults to the configured value)
        #[arg(long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let base_dir = resolve_base_dir(cli.home)?;

    match cli.command {
        Commands::Init => cmd_init(&base_dir),
        Commands::Status => cmd_status(&base_dir),
        Commands::Pause => cmd_set_paused(&base_dir, true),
        Commands::Resume => cmd_set_paused(&base_dir, false),
        Commands::Agents => cmd_agents(),
        Commands::Report { input } => cmd_report(&input),
        Commands::Diagnostic { project, output } => cmd_diagnostic(project, output),
        Commands::Cleanup { days } => cmd_cleanup(&base_dir, days).await,
    }
}

fn resolve_base_dir(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(dir) => Ok(dir),
        None => dirs::home_dir()
            .map(|h| h.join(".wave-orch"))
            .context("Could not determine home directory; pass --home"),
    }
}

fn load_config(base_dir: &Path) -> Result<OrchConfig> {
    OrchConfig::load_or_default(base_dir)
        .with_context(|| format!("Failed to load config from {}", base_dir.display()))
}

/// Catalog with availability probed from PATH
fn detected_registry() -> Arc<AgentRegistry> {
    let user_home = dirs::home_dir().unwrap_or_default();
    let registry = AgentRegistry::with_default_agents(&user_home);
    registry.detect_available_agents();
    Arc::new(registry)
}

fn cmd_init(base_dir: &Path) -> Result<()> {
    let path = OrchConfig::write_default(base_dir).context("Failed to write default config")?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_status(base_dir: &Path) -> Result<()> {
    let config = load_config(base_dir)?;
    let flag = FilePauseFlag::new(config.pause_flag_path());
    let registry = detected_registry();

    let available: Vec<String> = registry
        .get_available_agents()
        .into_iter()
        .map(|a| a.name)
        .collect();

    let status = serde_json::json!({
        "base_dir": config.base_dir,
        "paused": flag.is_paused(),
        "available_agents": available,
        "max_parallel": config.engine.max_parallel,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn cmd_set_paused(base_dir: &Path, paused: bool) -> Result<()> {
    let config = load_config(base_dir)?;
    let flag = FilePauseFlag::new(config.pause_flag_path());
    flag.set_paused(paused)
        .with_context(|| format!("Failed to update {}", flag.path().display()))?;

    info!("Pause flag set to {}", paused);
    println!("{}", if paused { "Paused" } else { "Resumed" });
    Ok(())
}

fn cmd_agents() -> Result<()> {
    let registry = detected_registry();
    for agent in registry.list_agents() {
        let marker = if agent.available { "✓" } else { "✗" };
        println!(
            "{} {:<12} {:<8} [{}]",
            marker,
            agent.name,
            agent.exec_cmd,
            agent.capabilities.join(", ")
        );
    }
    Ok(())
}

fn cmd_report(input: &Path) -> Result<()> {
    let output = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?
    };

    let report = ReportParser::new()
        .parse(&output)
        .context("Report block is not valid JSON")?;
    let Some(report) = report else {
        bail!("No <<<REPORT>>> block found");
    };

    validate_report_strict(Some(&report)).context("Report failed validation")?;
    println!("{}", serde_json::to_string_pretty(&redact_any(&report))?);
    Ok(())
}

fn cmd_diagnostic(project: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let inspector = ConfigInspector::new(detected_registry());
    let snapshot = inspector.generate_diagnostic(project.as_deref());

    match output {
        Some(path) => {
            inspector
                .save_diagnostic(&snapshot, &path)
                .with_context(|| format!("Failed to save diagnostic to {}", path.display()))?;
            println!("Saved diagnostic to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }
    Ok(())
}

async fn cmd_cleanup(base_dir: &Path, days: Option<i64>) -> Result<()> {
    let config = load_config(base_dir)?;
    let retention = days.unwrap_or(config.logging.retention_days);
    let logger = Logger::new(config.logs_dir(), retention);

    let removed = logger
        .clean_old_logs()
        .await
        .context("Failed to clean old logs")?;
    println!(
        "Removed {} log directories older than {} days",
        removed,
        logger.retention_days()
    );
    Ok(())
}
