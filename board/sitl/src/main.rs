use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::Context;
use hal::OutputDevice;
use assist::{Assist, AssistConfig, Board};
use clap::Parser;

use board::SitlBoard;
use pilot::{Pilot, PilotScript};
use sim::{SimHelicopter, Simulation};

mod board;
mod control_loop;
mod pilot;
mod sim;

#[derive(Parser, Debug)]
#[command(name = "sitl")]
#[command(about = "Run the helicopter assist against a simulated airframe")]
#[command(version)]
struct Args {
    /// Assist configuration file; written with defaults if missing
    #[arg(short, long, default_value = "assist.toml")]
    config: PathBuf,

    /// Run time in seconds
    #[arg(short, long, default_value_t = 20.0)]
    duration: f32,

    /// Seed for simulated gusts and output dither
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(path: &Path) -> anyhow::Result<AssistConfig> {
    if !path.exists() {
        let config = AssistConfig::default();
        match config.to_toml_string() {
            Ok(text) => match fs::write(path, text) {
                Ok(()) => log::info!("Wrote default configuration to {}", path.display()),
                Err(e) => log::warn!("Could not write default configuration to {}: {}", path.display(), e),
            },
            Err(e) => log::warn!("Could not serialize default configuration: {}", e),
        }
        return Ok(config);
    }
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    AssistConfig::from_toml_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn run_duration(seconds: f32) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f32(seconds.max(0.0)).with_context(|| format!("Invalid run duration {} s", seconds))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let duration = run_duration(args.duration)?;
    let seed = args.seed.unwrap_or(0);
    let mut assist = match args.seed {
        Some(seed) => Assist::with_seed(config, seed),
        None => Assist::new(config),
    }
    .context("Failed to build assist")?;

    let (board, endpoints) = SitlBoard::new();
    log::info!("Starting {} board, {} ms period", board.name(), config.period_ms);
    let mut resources = board.split_resources();

    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let mut simulation = Simulation::start(SimHelicopter::new(seed), endpoints.telemetry, endpoints.axes);
    let mut pilot = Pilot::start(PilotScript::new(), endpoints.pilot, command_tx);

    let stats = control_loop::run(&mut assist, &mut resources, &command_rx, duration);

    pilot.stop();
    simulation.stop();
    if !resources.output.neutral_all() {
        log::warn!("Output device rejected the final neutral write");
    }

    log::info!(
        "Finished: {} ticks, {} overruns, slowest tick {:?}",
        stats.ticks,
        stats.overruns,
        stats.max_tick
    );
    Ok(())
}
