//! sw-cli - Command line tool for Sentinel satellite index series.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "sw-cli",
    version,
    about = "Sentinel watch: incremental satellite index series with weather"
)]
struct Cli {
    #[command(subcommand)]
    command: sw_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }
    env_logger::init();
    let cli = Cli::parse();
    sw_cmd::run(cli.command).await
}
