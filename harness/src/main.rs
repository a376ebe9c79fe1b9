//! Launches a cluster of `exclusion-node` processes, then plays
//! coordinator: wait for liveness, let every node run one
//! critical-section cycle, verify and report the outcome, and shut
//! everything down.

mod coordinator;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use crate::coordinator::Coordinator;
use crate::server::Server;

/// Request delays in milliseconds, cycled by node ordinal. Staggered so
/// requests rarely collide exactly; a little jitter is added on top.
const BASE_DELAYS: [u64; 10] = [
    3000, 4000, 2000, 3500, 4500, 2500, 3800, 4200, 2800, 3200,
];

#[derive(StructOpt)]
#[structopt(name = "harness")]
struct Opt {
    /// Path to the node binary
    #[structopt(
        short = "n",
        long = "node",
        default_value = "target/debug/exclusion-node"
    )]
    node: PathBuf,

    /// Number of participants
    #[structopt(short = "c", long = "count", default_value = "3")]
    count: usize,

    /// Shared base port
    #[structopt(short = "p", long = "base-port", default_value = "8000")]
    base_port: u16,

    /// Path for the JSON report
    #[structopt(short = "r", long = "report", default_value = "report.json")]
    report: PathBuf,
}

fn init_logger() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Local::now().format("%d/%m/%Y %H:%M:%S%.3f"),
                record.level(),
                message,
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file("console.log")?)
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    // A fresh run starts from a clean shared log and evidence trail.
    let _ = std::fs::remove_file("console.log");
    for id in 1..=opt.count {
        let _ = std::fs::remove_file(format!("evidence-{:>02}.lamport", id));
    }

    init_logger().expect("failed to initialize logging");

    if opt.count < 2 {
        log::error!("at least two participants are required");
        std::process::exit(1);
    }

    let mut servers = Vec::new();
    for id in 1..=opt.count {
        let delay = BASE_DELAYS[(id - 1) % BASE_DELAYS.len()]
            + (250.0 * rand::random::<f32>()) as u64;
        log::info!("launching node-{} (request delay {} ms)", id, delay);
        match Server::spawn(&opt.node, id, opt.count, opt.base_port, delay) {
            Ok(server) => servers.push(server),
            Err(error) => {
                log::error!("could not spawn node-{}: {}", id, error);
                std::process::exit(1);
            }
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    let coordinator = Coordinator::new(opt.base_port, opt.count);
    if let Err(error) = coordinator.wait_for_nodes().await {
        log::error!("startup failed: {}", error);
        std::process::exit(1);
    }
    if let Err(error) = coordinator.wait_for_cycles().await {
        log::error!("cycles did not complete: {}", error);
    }

    let nodes = coordinator.collect().await;
    let report = coordinator.report(nodes);
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            if let Err(error) = std::fs::write(&opt.report, json) {
                log::warn!("could not write {}: {}", opt.report.display(), error);
            }
        }
        Err(error) => log::warn!("could not encode report: {}", error),
    }

    coordinator.shutdown().await;

    // Give children a moment to exit on their own before Drop reaps them.
    for _ in 0..20 {
        if servers.iter_mut().all(Server::exited) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    log::info!("simulation complete");
}
