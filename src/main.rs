use clap::Parser;
use polywatch::app::{App, Config};
use tracing::{error, info};

/// Real-time trade surveillance for prediction markets.
#[derive(Parser)]
#[command(name = "polywatch", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    config.init_logging();

    info!("polywatch starting");

    if let Err(e) = App::run(config).await {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}
