mod camera;
mod config;
mod control;
mod html;
mod telemetry;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use tracing::{info, warn};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    telemetry::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", config::USAGE);
        return Ok(());
    }
    let config = config::ServeConfig::from_args(&args)?;

    let _ = telemetry::init_metrics_recorder();

    // Serial is optional: a missing robot controller must not keep the camera
    // endpoints from serving.
    let serial = match config.serial_path.as_deref() {
        Some(path) => match control::SerialLink::open(path) {
            Ok(link) => {
                info!("serial connection established on {path}");
                Some(Arc::new(link))
            }
            Err(err) => {
                warn!("could not open serial port {path}: {err:#}");
                None
            }
        },
        None => None,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let server = camera::server::spawn_server(config.clone(), serial)?;
    info!("control server listening on http://0.0.0.0:{}", config.port);

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    info!("shutting down");
    server.stop();
    camera::shutdown();
    Ok(())
}
