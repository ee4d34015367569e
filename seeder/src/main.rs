use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use courses_core::{ClientConfig, CoursesClient};
use courses_seeder::{logger, Seeder};

/// Fill a courses service with synthetic courses, students, groups and
/// enrollments.
#[derive(Debug, Parser)]
#[command(name = "courses-seeder", version)]
struct Cli {
    /// Records to create of each kind.
    total_count: usize,

    /// Worker threads; 1 runs sequentially.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    threads: u16,

    /// Seed for reproducible data.
    #[arg(long)]
    seed: Option<u64>,

    /// TOML client configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured base URL.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);
    tracing::debug!(?cli, "parsed arguments");

    let mut config = ClientConfig::load(cli.config.as_deref()).context("loading client configuration")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
        config.validate().context("invalid --base-url")?;
    }
    tracing::info!(base_url = %config.base_url, "seeding courses service");

    let client = CoursesClient::from_config(&config);
    let mut seeder = Seeder::new(&client);
    if let Some(seed) = cli.seed {
        seeder = seeder.with_seed(seed);
    }

    let report = if cli.threads <= 1 {
        seeder.run_sequential(cli.total_count)?
    } else {
        seeder.run_concurrent(cli.total_count, usize::from(cli.threads))?
    };

    println!("{report}");
    if report.failures() > 0 {
        tracing::warn!(failures = report.failures(), "some records were not created");
    }
    Ok(())
}
