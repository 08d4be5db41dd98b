//! CLI entry point for yfactor-sweep
//!
//! Runs hot/cold load bias sweeps against the simulated DAQ bench and writes the rows to
//! CSV.
//!
//! # Usage
//!
//! Run a sweep with settings from a file, overriding the range:
//! ```bash
//! yfactor-sweep run --config config/ysweep.toml --min 0 --max 4 --step 0.02 --load-cycle 20
//! ```
//!
//! List the bias points a configuration would visit:
//! ```bash
//! yfactor-sweep points --config config/ysweep.toml --reverse
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use yfactor_sweep::config::Settings;
use yfactor_sweep::data::{CsvSink, RunMetadata};
use yfactor_sweep::hardware::mock::{SimulatedDaqBoard, SimulatedPowerMeter};
use yfactor_sweep::hardware::{DaqBias, DigitalLoadMover};
use yfactor_sweep::logging::{self, LoggingConfig, OutputFormat};
use yfactor_sweep::{
    generate_sweep_points, Instruments, SweepController, SweepError, SweepResult,
};

#[derive(Parser)]
#[command(name = "yfactor-sweep")]
#[command(about = "Hot/cold load bias sweeps with Y-factor and noise temperature", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a hot/cold sweep on the simulated bench
    Run {
        #[command(flatten)]
        sweep: SweepArgs,

        /// CSV output file (defaults to output.path)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Log format: pretty, compact or json
        #[arg(long, default_value = "pretty")]
        log_format: OutputFormat,
    },

    /// Print the bias points a sweep would visit
    Points {
        #[command(flatten)]
        sweep: SweepArgs,
    },
}

#[derive(Args)]
struct SweepArgs {
    /// Settings file
    #[arg(long, default_value = "config/ysweep.toml")]
    config: PathBuf,

    /// Lowest bias (mV)
    #[arg(long, allow_negative_numbers = true)]
    min: Option<f64>,

    /// Highest bias (mV)
    #[arg(long, allow_negative_numbers = true)]
    max: Option<f64>,

    /// Bias step (mV)
    #[arg(long)]
    step: Option<f64>,

    /// Sweep from max down to min
    #[arg(long)]
    reverse: bool,

    /// Points measured per load move
    #[arg(long)]
    load_cycle: Option<usize>,
}

impl SweepArgs {
    fn load_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load_from(&self.config)
            .with_context(|| format!("Failed to load settings from {}", self.config.display()))?;

        if let Some(min) = self.min {
            settings.sweep.min = min;
        }
        if let Some(max) = self.max {
            settings.sweep.max = max;
        }
        if let Some(step) = self.step {
            settings.sweep.step = step;
        }
        if self.reverse {
            settings.sweep.reverse = true;
        }
        if let Some(load_cycle) = self.load_cycle {
            settings.sweep.load_cycle = load_cycle;
        }

        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            sweep,
            output,
            log_format,
        } => run_sweep(sweep, output, log_format).await,
        Commands::Points { sweep } => print_points(sweep),
    }
}

fn print_points(args: SweepArgs) -> Result<()> {
    let settings = args.load_settings()?;
    let config = settings.sweep_config()?;
    for point in generate_sweep_points(&config) {
        println!("{:.4}", point);
    }
    Ok(())
}

async fn run_sweep(args: SweepArgs, output: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let settings = args.load_settings()?;
    logging::init(LoggingConfig::from_settings(&settings)?.with_format(format))?;

    let config = settings.sweep_config()?;
    let points = generate_sweep_points(&config);
    let instruments = simulated_bench(&settings);

    let path = output.unwrap_or_else(|| settings.output.path.clone());
    let mut sink = CsvSink::create(&path, &RunMetadata::from_config(&config))
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let controller = SweepController::new().with_retry_policy(settings.retry_policy());
    let stop = controller.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current load cycle");
            stop.request_stop();
        }
    });

    info!(
        bench = %settings.application.name,
        points = points.len(),
        output = %path.display(),
        "Starting sweep"
    );

    match controller.run_sweep(&points, &config, &instruments, &mut sink).await {
        Ok(result) => {
            print_summary(&result, points.len());
            println!("Rows written to {}", path.display());
            Ok(())
        }
        Err(SweepError::Stopped {
            next_index,
            partial,
        }) => {
            print_summary(&partial, points.len());
            println!(
                "Stopped before point {}; partial rows written to {}",
                next_index,
                path.display()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = e.partial() {
                print_summary(partial, points.len());
            }
            Err(e).context("Sweep failed")
        }
    }
}

/// Simulated DAQ bench wired the way the settings describe.
fn simulated_bench(settings: &Settings) -> Instruments {
    let channels = settings.daq.channels();
    let mover = &settings.load_mover;

    let board = Arc::new(
        SimulatedDaqBoard::new(channels, settings.calibration)
            .with_load_bit(mover.control_bit, mover.load_in_state),
    );
    let meter = Arc::new(SimulatedPowerMeter::new(board.clone()));
    let bias = Arc::new(
        DaqBias::new(board.clone(), channels, settings.calibration)
            .with_averaging(settings.daq.n_avg)
            .with_settle_time(settings.daq.bias_settle_time)
            .with_power_meter(meter),
    );

    let instruments = Instruments::new(bias.clone(), bias);
    if mover.enabled {
        let load = DigitalLoadMover::new(board, mover.control_bit, mover.load_in_state)
            .with_switch_time(mover.switch_time);
        instruments.with_load_actuator(Arc::new(load))
    } else {
        instruments
    }
}

fn print_summary(result: &SweepResult, planned: usize) {
    println!();
    println!("Measured {} of {} points", result.len(), planned);
    match result.best_tsys() {
        Some(best) => println!(
            "Minimum Tsys {:.1} K at {:.3} mV (Y = {:.3})",
            best.tsys, best.bias, best.y_factor
        ),
        None => println!("No valid noise temperature"),
    }
}
