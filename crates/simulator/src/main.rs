//! WinSync Simulator
//!
//! Command-line host for simulated WinSync contexts.
//!
//! Commands:
//! - `run`: register N contexts on one store, move the first one for a
//!   number of frames, then close them all
//! - `inspect`: check a dumped `windows` value for duplicate ids and
//!   overlapping windows

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::task::LocalSet;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use winsync_protocol::decode_snapshot;
use winsync_sim::inspect::{describe, inspect_snapshot};
use winsync_sim::{run_simulation, Config, SimulationReport};

#[derive(Parser)]
#[command(name = "winsync-sim")]
#[command(author, version, about = "Simulate browser windows sharing a WinSync store")]
struct Cli {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Configuration file (default: standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// Number of contexts
        #[arg(short, long)]
        contexts: Option<usize>,
        /// Number of frames
        #[arg(short, long)]
        ticks: Option<u32>,
        /// Print the stored snapshot after every step
        #[arg(long)]
        dump: bool,
    },
    /// Inspect a file holding a dumped `windows` value
    Inspect {
        /// Path to the snapshot JSON
        file: PathBuf,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn load_config(path: Option<&Path>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    loaded.unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    })
}

fn print_report(report: &SimulationReport, dump: bool) {
    if dump {
        for step in &report.steps {
            println!(
                "{}: count={} windows={}",
                step.label,
                step.count.as_deref().unwrap_or("-"),
                step.windows.as_deref().unwrap_or("-")
            );
        }
    }

    for status in &report.contexts {
        println!(
            "context {} (id {}): {} windows-changed, {} shape-changed, {} cubes",
            status.index, status.id, status.windows_changed, status.shape_changes, status.cubes
        );
    }
    if let Some(last) = report.last_step() {
        println!("final windows: {}", last.windows.as_deref().unwrap_or("-"));
    }
}

fn inspect_file(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read snapshot file: {}", file.display()))?;
    let windows = decode_snapshot(content.trim())
        .with_context(|| format!("Failed to parse snapshot file: {}", file.display()))?;

    println!("{} windows", windows.len());
    for (i, entry) in windows.iter().enumerate() {
        println!("  {}", describe(i, entry));
    }

    let findings = inspect_snapshot(&windows);
    if findings.is_empty() {
        println!("no problems found");
    }
    for finding in &findings {
        println!("warning: {}", finding);
    }
    Ok(())
}

/// Layer command-line options over the loaded config.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Commands::Run {
        contexts, ticks, ..
    } = &cli.command
    {
        if let Some(contexts) = contexts {
            config.simulation.contexts = *contexts;
        }
        if let Some(ticks) = ticks {
            config.simulation.ticks = *ticks;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref());
    apply_overrides(&mut config, &cli);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&config.logging.level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for w in config.validate() {
        warn!("Config: {} - {}", w.field, w.message);
    }

    match cli.command {
        Commands::Run { dump, .. } => {
            info!(
                "Simulating {} contexts for {} ticks ({} ms each)",
                config.simulation.contexts, config.simulation.ticks, config.simulation.tick_ms
            );
            let report = LocalSet::new()
                .run_until(run_simulation(&config.simulation, &config.scene))
                .await?;
            print_report(&report, dump);
        }
        Commands::Inspect { file } => inspect_file(&file)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::parse_from(["winsync-sim", "run", "--contexts", "4", "--dump"]);
        match cli.command {
            Commands::Run {
                contexts,
                ticks,
                dump,
            } => {
                assert_eq!(contexts, Some(4));
                assert_eq!(ticks, None);
                assert!(dump);
            }
            Commands::Inspect { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "winsync-sim",
            "run",
            "--config",
            "sim.toml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("sim.toml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_overrides_are_validated_with_config() {
        let cli = Cli::parse_from([
            "winsync-sim",
            "run",
            "--contexts",
            "0",
            "--ticks",
            "7",
            "--log-level",
            "loud",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.simulation.contexts, 0);
        assert_eq!(config.simulation.ticks, 7);

        let fields: Vec<_> = config.validate().into_iter().map(|w| w.field).collect();
        assert_eq!(fields, vec!["simulation.contexts", "logging.level"]);
        assert_eq!(config.simulation.contexts, 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_inspect_ignores_run_overrides() {
        let cli = Cli::parse_from(["winsync-sim", "inspect", "dump.json"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.simulation.contexts, 3);
        assert_eq!(config.simulation.ticks, 60);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }

    #[test]
    fn test_load_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("missing.toml")));
        assert_eq!(config.simulation.contexts, 3);
    }

    #[test]
    fn test_inspect_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"[{{"id":1,"shape":{{"x":0,"y":0,"w":10,"h":10}},"metaData":{{}}}}]"#
        )
        .unwrap();
        assert!(inspect_file(file.path()).is_ok());
    }

    #[test]
    fn test_inspect_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let err = inspect_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse snapshot file"));
    }
}
