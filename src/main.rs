use clap::Parser; // for cli
use survey_intake::config::Args;
use tracing_subscriber::{EnvFilter, fmt};

// this is main async function with tokio
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();
    survey_intake::start_server(args).await
}
