use clap::Parser;
use tracing::info;

use pos_procurement::{config, migrator};

#[derive(Debug, Parser)]
#[command(name = "migration", about = "Apply pending database migrations")]
struct Args {
    /// Database URL; defaults to the configured `database_url`
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    config::init_tracing("info", false);

    let database_url = match args.database_url {
        Some(url) => url,
        None => config::load_config()?.database_url,
    };
    info!("Starting database migration");
    migrator::run_migration(&database_url).await
}
