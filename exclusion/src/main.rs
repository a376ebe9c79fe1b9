use structopt::StructOpt;

use exclusion::Arithmetic;

#[derive(StructOpt)]
#[structopt(name = "exclusion-node")]
struct Opt {
    /// Unique node ID, 1-based
    #[structopt(short = "i", long = "id")]
    id: usize,

    /// Total number of participants
    #[structopt(short = "c", long = "count")]
    count: usize,

    /// Shared base port; this node listens at base-port + id
    #[structopt(short = "p", long = "base-port", default_value = "8000")]
    base_port: u16,

    /// Delay before requesting the critical section (in milliseconds)
    #[structopt(short = "d", long = "delay", default_value = "2000")]
    delay: u64,

    /// Directory for evidence records
    #[structopt(short = "e", long = "evidence-dir", default_value = ".")]
    evidence_dir: std::path::PathBuf,
}

/// Mirror this node's output into the shared `console.log` next to stdout,
/// so one file interleaves the whole cluster's run.
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
    init_logger().expect("failed to initialize logging");

    let workload = Arithmetic::new(&opt.evidence_dir, opt.id)
        .expect("failed to open evidence store");

    let config = lamport::Config::new(opt.id, opt.count, opt.base_port)
        .with_delay(std::time::Duration::from_millis(opt.delay));

    if let Err(error) = config.run(workload).await {
        log::error!("[node-{}] fatal: {}", opt.id, error);
        std::process::exit(1);
    }
}
