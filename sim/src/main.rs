//! Elyx member-journey simulator CLI.
//!
//! `sim run` drives the two-agent chat through simulated weeks and writes the
//! diary and Timeline JSON export; `sim validate` checks an export against the
//! bundled schema.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use sim::core::state::SimState;
use sim::exit_codes;
use sim::io::config::{DEFAULT_CONFIG_FILE, SimConfig, load_config, write_config};
use sim::io::export::load_export;
use sim::io::llm::Provider;
use sim::io::schema::{SchemaKind, validate_value};
use sim::io::state_store::write_state;
use sim::logging;
use sim::simulate::{Stop, build_client, run_simulation};

#[derive(Parser)]
#[command(
    name = "sim",
    version,
    about = "Elyx member-journey simulator with cadence guardrails"
)]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config and seed member state if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the simulation and export the diary and Timeline JSON.
    Run {
        /// Simulated weeks (overrides config and MAX_WEEKS).
        #[arg(long)]
        weeks: Option<u32>,
        /// 1 = morning only, 2 = morning and evening.
        #[arg(long)]
        turns_per_day: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
        /// Use canned replies instead of a provider.
        #[arg(long)]
        offline: bool,
    },
    /// Check an export file against the bundled JSON Schema.
    Validate { export: PathBuf },
}

fn main() {
    let dotenv = dotenvy::dotenv();
    logging::init();
    if let Err(err) = dotenv {
        debug!(error = %err, ".env not loaded");
    }
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run {
            weeks,
            turns_per_day,
            seed,
            offline,
        } => {
            let overrides = RunOverrides {
                weeks,
                turns_per_day,
                seed,
                offline,
            };
            cmd_run(&cli.config, &overrides)
        }
        Command::Validate { export } => cmd_validate(&export),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    let cfg = if config_path.exists() && !force {
        load_config(config_path)?
    } else {
        let cfg = SimConfig::default();
        write_config(config_path, &cfg)?;
        println!("init: wrote {}", config_path.display());
        cfg
    };
    if force || !cfg.paths.state.exists() {
        write_state(&cfg.paths.state, &SimState::default())?;
        println!("init: wrote {}", cfg.paths.state.display());
    }
    Ok(exit_codes::OK)
}

/// Command-line values layered over config and environment.
#[derive(Debug, Default)]
struct RunOverrides {
    weeks: Option<u32>,
    turns_per_day: Option<u32>,
    seed: Option<u64>,
    offline: bool,
}

impl RunOverrides {
    fn apply(&self, cfg: &mut SimConfig) -> Result<()> {
        if let Some(weeks) = self.weeks {
            cfg.max_weeks = weeks;
        }
        if let Some(turns) = self.turns_per_day {
            cfg.turns_per_day = turns;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.offline {
            cfg.llm.provider = Provider::Offline;
        }
        cfg.validate()
    }
}

fn cmd_run(config_path: &Path, overrides: &RunOverrides) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
    overrides.apply(&mut cfg)?;

    let api_key = std::env::var(&cfg.llm.api_key_env).ok();
    let llm = build_client(&cfg.llm, api_key)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %err, "ctrl-c handler not installed");
    }

    let outcome = run_simulation(&cfg, &llm, &interrupted).context("run simulation")?;
    println!(
        "run: id={} weeks={} messages={} export={} diary={}",
        outcome.run_id,
        outcome.weeks_completed,
        outcome.messages,
        outcome.paths.json.display(),
        outcome.paths.diary.display()
    );
    match &outcome.stop {
        Stop::Completed => {}
        Stop::Crashed(reason) => eprintln!("run: crashed: {reason}"),
        Stop::Interrupted => eprintln!("run: interrupted"),
    }
    Ok(exit_codes::for_stop(&outcome.stop))
}

fn cmd_validate(export: &Path) -> Result<i32> {
    let value = load_export(export)?;
    validate_value(SchemaKind::Export, &value)
        .with_context(|| format!("validate {}", export.display()))?;
    println!("validate: {} ok", export.display());
    Ok(exit_codes::OK)
}
