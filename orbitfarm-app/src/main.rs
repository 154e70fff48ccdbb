mod console;
mod engine;
mod error;
mod settings;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use clap::Parser;
use tracing::{error, info};

use orbitfarm_core::Partition;
use orbitfarm_dispatch::{Coordinator, Dispatcher};

use engine::{HitGrid, OrbitEngine};
use error::AppError;
use settings::{Loaded, RunSettings};
use store::GridStore;

/// How often the main thread checks the close timer and the pool.
const MAIN_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(name = "orbitfarm", version, about = "Long-running per-pixel fractal accumulation")]
struct Args {
    /// Settings file; created with defaults if missing.
    #[arg(long, default_value = "orbitfarm.json")]
    config: PathBuf,

    /// Override the worker count from the settings file.
    #[arg(long)]
    threads: Option<usize>,

    /// Do not read control commands from stdin.
    #[arg(long)]
    no_console: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let mut settings = match RunSettings::load_or_create(&args.config)? {
        Loaded::Existing(settings) => settings,
        Loaded::Created(path) => {
            info!("Settings file created at {}; edit it and run again", path.display());
            return Ok(());
        }
    };
    if let Some(threads) = args.threads {
        settings.threads = threads;
    }
    settings.validate()?;

    let mapping = settings.mapping()?;
    let rect = settings.work_rect(&mapping)?;
    let partition = Partition::build(rect, settings.threads, settings.mode.decorrelate())?;
    let cadence = settings.cadence(SystemTime::now())?;
    let coordinator = Arc::new(Coordinator::new(partition, cadence));

    let run_dir = settings::run_directory(&args.config);
    let grid = Arc::new(HitGrid::new(settings.width, settings.height));
    let engine = OrbitEngine::new(mapping, settings.mode, settings.iterations, Arc::clone(&grid));
    let store = GridStore::new(grid, run_dir.join(&settings.staging_file));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&coordinator),
        engine,
        store,
        settings.threads,
        settings.artifact_plan(&run_dir),
    )?);

    info!(
        width = settings.width,
        height = settings.height,
        threads = settings.threads,
        mode = settings.mode.label(),
        units = rect.area(),
        first_save_s = cadence.first_save.as_secs(),
        "Starting OrbitFarm"
    );

    if !args.no_console {
        console::spawn(Arc::clone(&coordinator));
    }

    let shutdown = Arc::clone(dispatcher.shutdown_timer());
    let pool = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::Builder::new()
            .name("worker-pool".into())
            .spawn(move || orbitfarm_dispatch::run(&dispatcher))
            .expect("Failed to spawn worker pool thread")
    };

    // The close timer ends the process even if stragglers are still leaving
    // their loops; a plain abort ends it once the pool is gone.
    loop {
        if shutdown.is_due() {
            info!("Close timer fired; exiting");
            break;
        }
        if pool.is_finished() && shutdown.deadline().is_none() {
            break;
        }
        thread::sleep(MAIN_POLL);
    }

    if pool.is_finished() {
        let report = pool.join().map_err(|_| AppError::PoolPanicked)??;
        if report.persist_failures > 0 {
            error!(failures = report.persist_failures, "Some checkpoints were not written");
        }
    }
    Ok(())
}
