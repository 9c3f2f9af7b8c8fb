use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use marketsweep::{
    Overrides, SweepSettings, WorkerCommand, execute_sweep, execute_worker, init_logging,
};

#[derive(Parser, Debug)]
#[command(name = "marketsweep")]
#[command(about = "Parameter sweeps over step-based market simulations")]
struct Args {
    /// Path to the sweep configuration (YAML)
    config: PathBuf,

    /// Execute only this run and print its outcome as one JSON line
    #[arg(long)]
    run_index: Option<usize>,

    /// Directory for the study, errors and metadata artifacts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Base seed; run i uses seed + i
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let mut settings = SweepSettings::load(&args.config)?;
    settings.apply(&Overrides {
        output_dir: args.output_dir.clone(),
        seed: args.seed,
    });

    // Workers share the parent's log file through inherited stderr only
    if let Some(run_index) = args.run_index {
        init_logging(None, &args.log_level)?;
        settings.validate()?;
        let line = execute_worker(&settings, run_index)?;
        println!("{line}");
        return Ok(());
    }

    init_logging(Some(&settings.log_dir), &args.log_level)?;
    settings.validate()?;

    let program = std::env::current_exe().wrap_err("cannot locate the marketsweep executable")?;
    let worker = WorkerCommand::new(
        program,
        &args.config.to_string_lossy(),
        &args.log_level,
        settings.seed,
    );
    let report = execute_sweep(&settings, &worker)?;

    tracing::info!(
        "{} runs: {} succeeded, {} failed",
        report.metadata.run_count,
        report.metadata.good_count,
        report.metadata.bad_count
    );
    println!("{}", report.paths.study.display());
    println!("{}", report.paths.errors.display());
    println!("{}", report.paths.meta.display());
    Ok(())
}
