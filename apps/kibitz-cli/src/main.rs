mod report;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use async_stream::stream;
use clap::{Parser, Subcommand, ValueEnum};
use futures::{pin_mut, Stream, StreamExt};
use kibitz_archive::load_pgn_file;
use kibitz_network::{EventHub, EventSink};
use kibitz_ops::{init_tracing, AnalysisLog};
use kibitz_orchestrator::{KibitzerMultiplexer, ProcessLauncher};
use kibitz_types::{config::KibitzConfig, notation::load_position, pv, Side};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "configs/kibitz.toml";

#[derive(Parser, Debug)]
#[command(author, version, about = "Live and archived chess engine analysis", long_about = None)]
struct Args {
    /// Config file. Defaults to $KIBITZ_CONFIG, then configs/kibitz.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse FENs read from stdin with the configured engines.
    ///
    /// Every published event is written to stdout as one JSON line. A line
    /// of the form `select <slot>` switches the active engine.
    Watch,
    /// Print the engine annotations stored in a PGN archive as JSON
    Annotations {
        pgn: PathBuf,
        /// Also report where each line departs from the opponent's previous one
        #[arg(long)]
        divergence: bool,
    },
    /// Find where two coordinate-notation lines disagree
    Diverge {
        /// Position both lines are compared from
        #[arg(long)]
        fen: String,
        #[arg(long)]
        first: String,
        #[arg(long, value_enum)]
        first_side: SideArg,
        #[arg(long)]
        second: String,
        #[arg(long, value_enum)]
        second_side: SideArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SideArg {
    White,
    Black,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::White => Side::White,
            SideArg::Black => Side::Black,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config);
    if let Err(err) = init_tracing(&config.ops) {
        eprintln!("Logging disabled: {err}");
    }

    match args.command {
        Command::Watch => watch(config).await,
        Command::Annotations { pgn, divergence } => annotations(pgn, divergence),
        Command::Diverge {
            fen,
            first,
            first_side,
            second,
            second_side,
        } => {
            diverge(&fen, &first, first_side.into(), &second, second_side.into());
            Ok(())
        }
    }
}

async fn watch(config: KibitzConfig) -> Result<()> {
    if config.engines.is_empty() {
        bail!("no engines configured; add [[engines]] entries to the config file");
    }

    let hub = Arc::new(EventHub::default());
    let log = AnalysisLog::new();
    let mut events = hub.subscribe();
    let printer = {
        let log = log.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("failed to encode event: {err}"),
                }
                log.record(event).await;
            }
        })
    };

    let launcher = Arc::new(ProcessLauncher::new(config.engines.clone()));
    let mux = KibitzerMultiplexer::start(
        launcher,
        config.session.clone(),
        config.multiplexer.clone(),
        hub.clone(),
    )
    .await?;

    let input = stdin_lines();
    pin_mut!(input);
    while let Some(line) = input.next().await {
        if let Some(slot) = line.strip_prefix("select ") {
            match slot.trim().parse() {
                Ok(slot) => mux.select(slot),
                Err(_) => warn!(line = %line, "expected `select <slot>`"),
            }
            continue;
        }
        match load_position(&line) {
            Ok(_) => mux.analyze(line),
            Err(err) => warn!(line = %line, "ignoring input: {err}"),
        }
    }

    info!("input closed, shutting down");
    mux.shutdown().await;
    drop(hub);
    let _ = printer.await;
    eprintln!("{}", log.summary_json().await?);
    Ok(())
}

fn stdin_lines() -> impl Stream<Item = String> {
    stream! {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        yield line.to_string();
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("reading stdin failed: {err}");
                    break;
                }
            }
        }
    }
}

fn annotations(path: PathBuf, divergence: bool) -> Result<()> {
    let games = load_pgn_file(&path)?;
    info!(games = games.len(), path = %path.display(), "archive loaded");
    let reports: Vec<_> = games
        .iter()
        .map(|game| report::game_report(game, divergence))
        .collect();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn diverge(fen: &str, first: &str, first_side: Side, second: &str, second_side: Side) {
    let first: Vec<String> = first.split_whitespace().map(String::from).collect();
    let second: Vec<String> = second.split_whitespace().map(String::from).collect();
    let offset = pv::first_difference(
        pv::normalize(&first, first_side, fen),
        pv::normalize(&second, second_side, fen),
    );
    match offset {
        Some(offset) => println!("{offset}"),
        None => println!("none"),
    }
}

fn load_config(from_args: Option<PathBuf>) -> KibitzConfig {
    let path = from_args
        .or_else(|| env::var("KIBITZ_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    match KibitzConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                KibitzConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            KibitzConfig::default()
        }
    }
}
