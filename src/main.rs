mod aggregate;
mod chart;
mod config;
mod error;
mod report;
mod runner;
mod slack;

use clap::Parser;
use config::Config;
use error::Error;
use log::error;

#[derive(Parser)]
#[command(about = "Pulls daily ad performance from the Adjust reporting API and posts charts to Slack")]
struct Args {
    #[command(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::init();

    if let Err(err) = runner::publish_daily_report(args.config).await {
        error!("failed to publish daily report: {}", err);
        std::process::exit(1);
    }

    Ok(())
}
