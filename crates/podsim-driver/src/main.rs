mod config;
mod sim;
mod telemetry;

use clap::Parser;
use config::{CliArgs, DriverConfig};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let log_json = args.log_json;
    let config = DriverConfig::try_from(args)?;

    telemetry::init_telemetry(log_json)?;
    log_startup_info(&config);

    let report = sim::run(&config)?;

    tracing::info!(
        objects = report.objects,
        ready = report.ready,
        failed = report.failed,
        panicked = report.panicked,
        distinct_ips = report.distinct_ips,
        allocated = report.allocated,
        free = report.free,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Simulation finished"
    );

    if report.failed > 0 || report.panicked > 0 {
        anyhow::bail!(
            "{} of {} objects failed to reconcile",
            report.failed + report.panicked,
            report.objects
        );
    }
    Ok(())
}

fn log_startup_info(config: &DriverConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting simulation with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting simulation of {} objects over {} with {} workers",
            config.objects,
            config.pod_range,
            config.capacity
        );
    }
}
