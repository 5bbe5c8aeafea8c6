mod cli;
mod config;
mod error;
mod ledger;
mod logging;
mod mapping;
mod migrate;
mod model;
mod providers;
mod source;

use anyhow::Result;

use cli::Command;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match cli::parse_args(&args)? {
        Command::Run { config } => cli::handle_run(&config).await,
        Command::Watch { config, interval } => cli::handle_watch(&config, interval).await,
        Command::Help => {
            cli::print_help();
            Ok(())
        }
    }
}
