//! Voltaic - circuit simulation from the command line
//!
//! Runs a preset circuit frame by frame and prints the node voltages.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info voltaic divider --frames 3
//! voltaic rc --frames 20 --frame-time 0.0005 --timestep 1e-5
//! ```

use clap::Parser;
use log::error;
use voltaic_core::{presets, solver::DEFAULT_TIMESTEP, Result, SimStatus, Simulator, SimulatorConfig};

/// Frame-driven MNA circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Preset circuit to run (omit to list presets)
    #[arg(value_name = "PRESET")]
    preset: Option<String>,

    /// Number of frames to run
    #[arg(short, long, default_value_t = 10)]
    frames: usize,

    /// Elapsed time per frame in seconds
    #[arg(long, default_value_t = 1e-3)]
    frame_time: f64,

    /// Simulation timestep in seconds
    #[arg(short, long, default_value_t = DEFAULT_TIMESTEP)]
    timestep: f64,

    /// Maximum Newton-Raphson iterations per timestep
    #[arg(long, default_value_t = voltaic_core::solver::DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Disable matrix simplification
    #[arg(long)]
    no_simplify: bool,
}

fn list_presets() {
    println!("Available presets:");
    for preset in presets::PRESETS {
        println!("  {:<12} {}", preset.name, preset.description);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let Some(name) = args.preset.as_deref() else {
        list_presets();
        return Ok(());
    };
    let Some(preset) = presets::find(name) else {
        error!("Unknown preset '{}'", name);
        list_presets();
        std::process::exit(2);
    };

    let config = SimulatorConfig::new()
        .with_timestep(args.timestep)
        .with_max_iterations(args.max_iterations)
        .with_max_steps_per_frame(((args.frame_time / args.timestep).ceil() as usize).max(1) * 2)
        .with_simplify(!args.no_simplify);
    let mut sim = Simulator::with_config(preset.build(), config)?;

    println!("# {} - {}", preset.name, preset.description);
    for frame in 0..args.frames {
        let report = match sim.advance(args.frame_time) {
            Ok(report) => report,
            Err(err) => {
                error!("Frame {}: {}", frame, err);
                return Err(err);
            }
        };

        let status = match &report.status {
            SimStatus::Ok => "ok".to_string(),
            other => format!("{other:?}"),
        };
        let mut line = format!(
            "frame {:>4}  t={:.6e}s  steps={:<5} iters={:<6} {}",
            frame, report.time, report.steps, report.iterations, status
        );
        if let Some(table) = sim.node_table() {
            let mut points: Vec<_> = sim
                .circuit()
                .elements()
                .iter()
                .flat_map(|e| e.terminals().points.iter().cloned())
                .filter(|p| table.node_for(p).is_some_and(|n| !n.is_ground()))
                .collect();
            points.sort_by(|a, b| a.label().cmp(b.label()));
            points.dedup();
            for point in points {
                if let Some(v) = sim.node_voltage(point.clone()) {
                    line.push_str(&format!("  {}={:.6}", point, v));
                }
            }
        }
        println!("{line}");
    }

    Ok(())
}
