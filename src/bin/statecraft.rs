//! Statecraft CLI Binary
//!
//! Runs the store and contract reference scenarios and prints what a consumer
//! subscribed to `update` would observe.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use statecraft::config::{ConfigLoader, StatecraftConfig};
use statecraft::logging::init_logging;
use statecraft::{Contract, Store};
use std::cell::Cell;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tracing::{error, info};

/// Statecraft CLI - shared reactive state demos
#[derive(Parser)]
#[command(name = "statecraft")]
#[command(about = "Memoized stores and single-flight async contracts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a player to a roster store and list the active players
    Players {
        /// Player name
        #[arg(long, default_value = "A")]
        name: String,
        /// Team name
        #[arg(long, default_value = "X")]
        team: String,
    },
    /// Execute a delayed contract twice before it settles
    Answer {
        /// Delay before the operation resolves (milliseconds)
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
    },
}

#[derive(Debug, Serialize)]
struct Player {
    name: String,
    team: String,
    score: u32,
    #[serde(skip_serializing_if = "Option::is_none", rename = "isActive")]
    is_active: Option<bool>,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(Some(&config.logging)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Statecraft CLI starting");

    let result = match &cli.command {
        Commands::Players { name, team } => run_players(name, team),
        Commands::Answer { delay_ms } => run_answer(&config, *delay_ms),
    };

    match result {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Precedence: CLI flags override environment override config file override defaults.
fn load_config(cli: &Cli) -> Result<StatecraftConfig> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::new().with_file(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

fn roster() -> Result<Store<Vec<Player>>> {
    let store = Store::builder(Vec::new())
        .setter("addNewPlayer", |players: &mut Vec<Player>, args: &[Value]| {
            players.push(Player {
                name: args.first().and_then(Value::as_str).unwrap_or_default().to_string(),
                team: args.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
                score: 0,
                is_active: None,
            });
        })
        .getter("getActivePlayers", |players: &Vec<Player>, _: &[Value]| {
            let active: Vec<&Player> = players
                .iter()
                .filter(|p| p.is_active.unwrap_or(false))
                .collect();
            json!(active)
        })
        .build()?;
    Ok(store)
}

fn run_players(name: &str, team: &str) -> Result<String> {
    let store = roster()?;
    let updates = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&updates);
    store
        .events()
        .subscribe("update", move |_| counter.set(counter.get() + 1));

    store.set("addNewPlayer", &[json!(name), json!(team)])?;
    let active = store.get("getActivePlayers", &[])?;

    Ok(format!("active players: {}\nupdates: {}", active, updates.get()))
}

fn run_answer(config: &StatecraftConfig, delay_ms: u64) -> Result<String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start runtime")?;

    let invocations = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&invocations);
    let operation = move |_: ()| {
        counter.set(counter.get() + 1);
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<u32, String>(42)
        }
    };
    let contract = Contract::with_options(operation, config.contract.clone())?;
    let instance = contract.instance(())?;

    let (first, second) = LocalSet::new().block_on(&runtime, async {
        let first = instance.execute();
        let second = instance.execute();
        futures::join!(first, second)
    });
    let first = first.map_err(|e| anyhow!("first execute failed: {}", e))?;
    let second = second.map_err(|e| anyhow!("second execute failed: {}", e))?;

    Ok(format!(
        "first: {}\nsecond: {}\ninvocations: {}",
        first,
        second,
        invocations.get()
    ))
}
