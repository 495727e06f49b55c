//! tumble CLI - runs small rigid-body scenes from the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tumble_math::{Pose, Vec3};
use tumble_physics::{BroadPhaseKind, Shape, World, WorldConfig};

#[derive(Parser)]
#[command(name = "tumble")]
#[command(about = "Minimal rigid-body dynamics simulator", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop a unit sphere onto a ground plane and print its height each step
    Hello {
        /// Number of fixed steps to run
        #[arg(short, long, default_value_t = 300)]
        steps: u32,
        /// Initial sphere height
        #[arg(long, default_value_t = 50.0)]
        height: f64,
        /// World config in TOML (defaults used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Use the all-pairs broadphase instead of the BVH
        #[arg(long)]
        brute_force: bool,
    },
    /// Print the default world config as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Hello {
            steps,
            height,
            config,
            brute_force,
        }) => {
            let mut config = load_config(config.as_deref())?;
            if brute_force {
                config.broadphase = BroadPhaseKind::BruteForce;
            }
            run_hello(config, steps, height)?;
        }
        Some(Commands::Config) => {
            print!("{}", WorldConfig::default().to_toml_string()?);
        }
        None => {
            run_hello(WorldConfig::default(), 300, 50.0)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = WorldConfig::from_toml_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

fn run_hello(config: WorldConfig, steps: u32, height: f64) -> Result<()> {
    let dt = config.timestep;
    let iterations = config.solver.iterations;
    let mut world = World::new(config)?;

    let ground = world.add(Arc::new(Shape::plane(Vec3::y(), 1.0)), 0.0, Pose::identity())?;
    let sphere = world.add(
        Arc::new(Shape::sphere(1.0)),
        1.0,
        Pose::from_position(0.0, height, 0.0),
    )?;

    for _ in 0..steps {
        world.step(dt, iterations)?;
        println!("sphere height: {}", world.pose(sphere)?.position.y);
    }

    let diagnostics = world.diagnostics();
    info!(
        steps = diagnostics.steps,
        final_height = world.pose(sphere)?.position.y,
        divergent_steps = diagnostics.divergent_steps,
        unregistered_pairs = diagnostics.unregistered_pairs,
        "simulation finished"
    );

    world.remove_body(sphere)?;
    world.remove_body(ground)?;
    Ok(())
}
