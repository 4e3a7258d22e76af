use clap::Parser;
use env_logger::Env;

use inpage_threads::cli::{self, Cli, run_command};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(err) = run_command(cli).await {
        eprintln!("{}", cli::error_message(&format!("{:#}", err)));
        std::process::exit(1);
    }
}
