use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "warden-controller", version, about = "Search-driven alerting engine")]
struct Opts {
    #[arg(long, help = "Directory containing declarative record manifests")]
    manifests: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let opts = Opts::parse();
    tracing::info!(manifests = %opts.manifests.display(), "searchwarden controller starting");

    if let Err(e) = warden_controller::run::run(&opts.manifests).await {
        tracing::error!(error = %e, "controller error");
        std::process::exit(1);
    }
}
