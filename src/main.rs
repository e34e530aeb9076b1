use clap::Parser;
use tracing_subscriber::EnvFilter;

use alphabot_teleop::config::ServerArgs;

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = alphabot_teleop::runtime::run(args).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
