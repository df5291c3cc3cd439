use anyhow::{Context, Result};
use clap::Parser;
use depthseg_hw::{DeviceProfile, MonotonicClock, PipelineSpec, SyntheticDevice};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod sink;

use config::Config;
use engine::{Engine, EngineError, EngineOptions};

#[derive(Parser)]
#[command(
    name = "depthseg",
    about = "Person segmentation fused with live color and stereo depth"
)]
struct Cli {
    /// Side length of the square segmentation tensor
    #[arg(long = "nn_shape", visible_alias = "shape", default_value_t = 256)]
    nn_shape: usize,

    /// Compiled segmentation model loaded onto the device
    #[arg(
        long = "nn_path",
        visible_alias = "nn",
        default_value = "models/deeplab_v3_plus_mvn2_decoder_256_openvino_2021.2_6shave.blob"
    )]
    nn_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    tracing::info!(
        nn_shape = cli.nn_shape,
        nn_path = %cli.nn_path.display(),
        "depthseg starting"
    );

    let profile = match &config.profile_path {
        Some(path) => DeviceProfile::load(path)?,
        None => DeviceProfile::builtin()?,
    };

    let clock = Arc::new(MonotonicClock::new());
    let mut device = SyntheticDevice::new(
        profile,
        PipelineSpec {
            nn_shape: cli.nn_shape,
            nn_path: cli.nn_path,
        },
        clock.clone(),
    )?;

    let mut engine = Engine::start(
        &mut device,
        clock,
        EngineOptions {
            nn_shape: cli.nn_shape,
            target_size: config.target_size,
            sync: config.sync,
            poll_interval: config.poll_interval,
            max_frames: config.max_frames,
        },
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let panel_size = (config.target_size * 3, config.target_size);
    let mut worker = tokio::task::spawn_blocking(move || -> Result<_, EngineError> {
        // The preview window must live on the thread that pumps it.
        let mut sink = sink::open_sink(&config, panel_size, sink::display_available())?;
        engine
            .run(sink.as_mut(), &flag)
            .map(|reason| (reason, engine.iterations()))
    });

    let outcome = tokio::select! {
        outcome = &mut worker => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, stopping");
            shutdown.store(true, Ordering::SeqCst);
            worker.await
        }
    };

    let (reason, iterations) = outcome.context("engine task failed")??;
    tracing::info!(?reason, iterations, "depthseg stopped");
    Ok(())
}
