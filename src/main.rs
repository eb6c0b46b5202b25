use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{self, LevelFilter, debug, error, info};

use rnaseq_pipelines::cli::{parse, Arguments};
use rnaseq_pipelines::config::defs::{PipelineConfig, PipelineError};
use rnaseq_pipelines::pipelines::rnaseq;
use rnaseq_pipelines::utils::system::detect_cores_and_load;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n RNA-seq trim / align\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let (max_cores, cpu_load) = detect_cores_and_load(args.threads).await?;
    debug!("Using {} threads per tool; CPU load {}%", max_cores, cpu_load);

    if let Err(e) = run(&args, &dir, max_cores).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn run(args: &Arguments, cwd: &std::path::Path, threads: usize) -> Result<(), PipelineError> {
    let config = Arc::new(PipelineConfig::from_args(args, cwd, threads)?);
    info!(
        "Library {:?}, mode {:?}, output {}",
        config.layout,
        config.mode,
        config.out_dir.display()
    );
    let summary = rnaseq::run(config).await?;
    println!(
        "{}/{} samples completed ({} failed)",
        summary.completed,
        summary.attempted,
        summary.failed()
    );
    Ok(())
}
