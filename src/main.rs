use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use restaurant_sim::simulation::{ConfigDiagnostics, RestaurantWorld, SimConfig};

#[derive(Parser)]
#[command(name = "restaurant_sim")]
#[command(about = "Headless restaurant floor simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "600")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Seed for reproducible restroom rolls
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file; missing fields fall back to defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the base number of incoming guests
    #[arg(long)]
    incoming: Option<u32>,

    /// Override the staff headcount
    #[arg(long)]
    staff: Option<u32>,

    /// Simulated seconds between summaries
    #[arg(long, default_value = "10")]
    report_every: f32,

    /// Draw the floor map with every summary
    #[arg(long)]
    map: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn,restaurant_sim=info"))
        .init();
    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli) -> Result<()> {
    let mut diagnostics = ConfigDiagnostics::new();
    let mut config = match &cli.config {
        Some(path) => SimConfig::from_json_file(path, &mut diagnostics)?,
        None => SimConfig {
            incoming: 10,
            arrivals_per_minute: 6.0,
            ..SimConfig::default()
        },
    };
    if let Some(incoming) = cli.incoming {
        config.incoming = incoming;
    }
    if let Some(staff) = cli.staff {
        config.staff_count = staff;
    }

    let mut world = match cli.seed {
        Some(seed) => RestaurantWorld::new_with_config_and_seed(config, seed),
        None => RestaurantWorld::new_with_config(config),
    };

    println!("Running restaurant simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);
    println!();
    println!("Initial state:");
    world.print_summary();
    if cli.map {
        world.draw_map();
    }

    let report_every = cli.report_every.max(cli.delta);
    let mut next_report = report_every;
    for tick in 1..=cli.ticks {
        world.tick(cli.delta);
        // Headless runs treat simulated time as wall-clock time
        world.advance_wall_clock(cli.delta);

        if world.time >= next_report {
            next_report += report_every;
            println!();
            println!("--- After tick {} ({:.1}s simulated time) ---", tick, world.time);
            world.print_summary();
            if cli.map {
                world.draw_map();
            }
        }
    }

    println!();
    println!("=== Final State ===");
    world.print_summary();
    if cli.map {
        world.draw_map();
    }

    let stats = world.stats();
    info!("{}", stats);
    info!("SIMULATION COMPLETE after {} ticks", cli.ticks);
    Ok(())
}
