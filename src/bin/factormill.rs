use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

#[derive(Parser)]
#[command(name = "factormill")]
#[command(about = "Compute per-day cross-sectional order-book factor means from snapshot CSV trees")]
struct Cli {
    /// Input root containing <MMDD>/<stock>/snapshot.csv
    #[arg(long)]
    input_root: PathBuf,

    /// Output directory for per-day <MMDD>.csv files
    #[arg(long)]
    output_root: PathBuf,

    /// Worker thread hint, clamped to min(8, hardware parallelism)
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let start = Instant::now();
    let stats = factormill::run(&cli.input_root, &cli.output_root, cli.threads)?;
    println!(
        "processed days={} files={} rows={} emitted={} elapsed_sec={:.4}",
        stats.days,
        stats.files,
        stats.rows,
        stats.emitted,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
